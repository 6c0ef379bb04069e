use bitcoin::{absolute, Amount, Network};
use satfund_config::{Config, PledgeConfig};
use satfund_primitives::{errors::LockTimeError, time::to_network_lock_time};

/// Parameters shared by every pledge, injected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PledgeParams {
    pub network: Network,
    /// Flat fee paid by the locking and the refund transaction.
    pub min_fee: Amount,
    /// Seconds between the contract lock time and the refund lock time.
    pub refund_locktime_offset: u64,
}

impl PledgeParams {
    pub fn new(network: Network, pledge: &PledgeConfig) -> Self {
        Self {
            network,
            min_fee: pledge.min_fee(),
            refund_locktime_offset: pledge.refund_locktime_offset_secs.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.bitcoin.network, &config.pledge)
    }

    /// Lock time of the contract guarding pledges to a project with `deadline`.
    pub fn contract_lock_time(&self, deadline: u64) -> Result<absolute::LockTime, LockTimeError> {
        to_network_lock_time(deadline)
    }

    /// Unix time from which refunds of such pledges become valid.
    pub fn refund_time(&self, deadline: u64) -> u64 {
        deadline.saturating_add(self.refund_locktime_offset)
    }

    pub fn refund_lock_time(&self, deadline: u64) -> Result<absolute::LockTime, LockTimeError> {
        to_network_lock_time(self.refund_time(deadline))
    }
}
