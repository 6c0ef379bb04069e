use std::{path::PathBuf, time::Duration};

use bitcoin::{Amount, Network};
use serde::{Deserialize, Serialize};

/// Default value for `datadir` in [`ClientConfig`].
const DEFAULT_DATADIR: &str = "satfund-data";

/// Default chain API endpoint, blockchain.info compatible.
const DEFAULT_CHAIN_API_URL: &str = "https://blockchain.info";

/// Default timeout for a single chain API request, in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default flat fee paid by every crafted transaction, in sats.
const DEFAULT_MIN_FEE_SATS: u64 = 100_000;

/// Default gap between the contract lock time and the refund lock time.
const DEFAULT_REFUND_LOCKTIME_OFFSET_SECS: u64 = 3600;

/// Default number of refund broadcast retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between refund broadcast attempts.
const DEFAULT_RETRY_BACKOFF_SECS: u64 = 3600;

/// Default DB retry count.
const DEFAULT_DB_RETRY_COUNT: u16 = 3;

/// Default DB retry delay in ms.
const DEFAULT_DB_RETRY_DELAY: u64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The data directory where database contents reside.
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            datadir: default_datadir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinConfig {
    pub network: Network,
}

/// Balance, unspent output and broadcast endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainApiConfig {
    #[serde(default = "default_chain_api_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ChainApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ChainApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_chain_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PledgeConfig {
    #[serde(default = "default_min_fee_sats")]
    pub min_fee_sats: u64,

    /// Added to a project's contract lock time to get the lock time of each
    /// pledge's refund transaction. Must be at least 1.
    #[serde(default = "default_refund_locktime_offset_secs")]
    pub refund_locktime_offset_secs: u64,
}

impl PledgeConfig {
    pub fn min_fee(&self) -> Amount {
        Amount::from_sat(self.min_fee_sats)
    }
}

impl Default for PledgeConfig {
    fn default() -> Self {
        Self {
            min_fee_sats: default_min_fee_sats(),
            refund_locktime_offset_secs: default_refund_locktime_offset_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

impl Default for RefundConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// For optimistic transactions, how many times to retry if a write fails.
    #[serde(default = "default_db_retry_count")]
    pub retry_count: u16,

    /// Db retry delay in ms.
    #[serde(default = "default_db_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            retry_count: default_db_retry_count(),
            retry_delay_ms: default_db_retry_delay(),
        }
    }
}

fn default_datadir() -> PathBuf {
    DEFAULT_DATADIR.into()
}

fn default_chain_api_url() -> String {
    DEFAULT_CHAIN_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_min_fee_sats() -> u64 {
    DEFAULT_MIN_FEE_SATS
}

fn default_refund_locktime_offset_secs() -> u64 {
    DEFAULT_REFUND_LOCKTIME_OFFSET_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_backoff_secs() -> u64 {
    DEFAULT_RETRY_BACKOFF_SECS
}

fn default_db_retry_count() -> u16 {
    DEFAULT_DB_RETRY_COUNT
}

fn default_db_retry_delay() -> u64 {
    DEFAULT_DB_RETRY_DELAY
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Service label to append to the service name (e.g., "prod", "dev").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_label: Option<String>,

    /// Directory path for file-based logging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Prefix for log file names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file_prefix: Option<String>,

    /// Use JSON format for logs instead of compact format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_format: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    pub bitcoin: BitcoinConfig,
    #[serde(default)]
    pub chain_api: ChainApiConfig,
    #[serde(default)]
    pub pledge: PledgeConfig,
    #[serde(default)]
    pub refund: RefundConfig,
    #[serde(default)]
    pub db: DbConfig,

    /// Logging configuration (optional section in TOML).
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Checks invariants serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.pledge.refund_locktime_offset_secs == 0 {
            return Err("pledge.refund_locktime_offset_secs must be at least 1".to_string());
        }
        if self.chain_api.request_timeout_secs == 0 {
            return Err("chain_api.request_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }
}
