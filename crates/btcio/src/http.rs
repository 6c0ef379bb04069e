//! Chain API client for a blockchain.info compatible HTTP service.

use std::{collections::HashMap, future::Future, str::FromStr, time::Duration};

use async_trait::async_trait;
use bitcoin::{
    bip32::{DerivationPath, Xpub},
    consensus::encode::serialize_hex,
    Amount, ScriptBuf, Transaction, Txid,
};
use reqwest::Client;
use satfund_primitives::utxo::UnspentOutput;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    client::{BroadcastResponse, Broadcaster, ChainQuery},
    error::{ClientError, ClientResult},
};

#[derive(Debug, Clone)]
pub struct HttpChainClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpChainClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    /// Bounds `fut` by the request timeout on top of the client's own.
    async fn bounded<T>(&self, fut: impl Future<Output = ClientResult<T>>) -> ClientResult<T> {
        timeout(self.request_timeout, fut)
            .await
            .map_err(|_| ClientError::Timeout(self.request_timeout))?
    }

    async fn get_text(&self, endpoint: &str, xpub: &Xpub) -> ClientResult<String> {
        let xpub = xpub.to_string();
        self.bounded(async {
            let resp = self
                .client
                .get(self.url(endpoint))
                .query(&[("active", xpub.as_str())])
                .send()
                .await
                .map_err(map_send_error)?;
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            if status != 200 {
                return Err(ClientError::Status { status, body });
            }
            Ok(body)
        })
        .await
    }
}

fn map_send_error(err: reqwest::Error) -> ClientError {
    if err.is_connect() {
        ClientError::Connection(err.to_string())
    } else {
        ClientError::Http(err)
    }
}

#[async_trait]
impl ChainQuery for HttpChainClient {
    async fn get_balance(&self, xpub: &Xpub) -> ClientResult<Amount> {
        let body = self.get_text("balance", xpub).await?;
        let balance = parse_balance(&body, xpub)?;
        debug!(%xpub, %balance, "fetched balance");
        Ok(balance)
    }

    async fn get_unspent(&self, xpub: &Xpub) -> ClientResult<Vec<UnspentOutput>> {
        let body = match self.get_text("unspent", xpub).await {
            Ok(body) => body,
            // The service answers 500 with this text for accounts without outputs.
            Err(ClientError::Status { body, .. }) if body.contains("No free outputs") => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e),
        };
        let utxos = parse_unspent(&body)?;
        debug!(%xpub, count = utxos.len(), "fetched unspent outputs");
        Ok(utxos)
    }
}

#[async_trait]
impl Broadcaster for HttpChainClient {
    async fn send_tx(&self, tx: &Transaction) -> ClientResult<BroadcastResponse> {
        let txid = tx.compute_txid();
        let raw = serialize_hex(tx);
        let resp = self
            .bounded(async {
                let resp = self
                    .client
                    .post(self.url("pushtx"))
                    .form(&[("tx", raw.as_str())])
                    .send()
                    .await
                    .map_err(map_send_error)?;
                let status = resp.status().as_u16();
                let message = resp.text().await?;
                Ok(BroadcastResponse::new(status, message.trim()))
            })
            .await?;

        if resp.is_accepted() {
            debug!(%txid, "broadcast accepted");
        } else {
            warn!(%txid, status = resp.status, message = %resp.message, "broadcast rejected");
        }
        Ok(resp)
    }
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    final_balance: u64,
}

#[derive(Debug, Deserialize)]
struct UnspentResponse {
    unspent_outputs: Vec<RawUnspent>,
}

#[derive(Debug, Deserialize)]
struct RawUnspent {
    tx_hash_big_endian: String,
    tx_output_n: u32,
    script: String,
    value: u64,
    xpub: RawXpubRef,
}

#[derive(Debug, Deserialize)]
struct RawXpubRef {
    path: String,
}

fn parse_balance(body: &str, xpub: &Xpub) -> ClientResult<Amount> {
    let entries: HashMap<String, BalanceEntry> =
        serde_json::from_str(body).map_err(|e| ClientError::Parse(e.to_string()))?;
    entries
        .get(&xpub.to_string())
        .map(|e| Amount::from_sat(e.final_balance))
        .ok_or_else(|| ClientError::Parse(format!("no balance entry for {xpub}")))
}

fn parse_unspent(body: &str) -> ClientResult<Vec<UnspentOutput>> {
    let resp: UnspentResponse =
        serde_json::from_str(body).map_err(|e| ClientError::Parse(e.to_string()))?;
    resp.unspent_outputs
        .into_iter()
        .map(RawUnspent::try_into_unspent)
        .collect()
}

impl RawUnspent {
    fn try_into_unspent(self) -> ClientResult<UnspentOutput> {
        let txid = Txid::from_str(&self.tx_hash_big_endian)
            .map_err(|e| ClientError::Parse(format!("txid: {e}")))?;
        let locking_script = ScriptBuf::from_hex(&self.script)
            .map_err(|e| ClientError::Parse(format!("script: {e}")))?;
        Ok(UnspentOutput {
            txid,
            output_index: self.tx_output_n,
            locking_script,
            value: Amount::from_sat(self.value),
            derivation_path: parse_relative_path(&self.xpub.path)?,
        })
    }
}

/// Parses `M/<role>/<index>` as reported by the service.
fn parse_relative_path(path: &str) -> ClientResult<DerivationPath> {
    let normalized = match path.strip_prefix('M') {
        Some(rest) => format!("m{rest}"),
        None => path.to_string(),
    };
    DerivationPath::from_str(&normalized)
        .map_err(|e| ClientError::Parse(format!("derivation path {path}: {e}")))
}
