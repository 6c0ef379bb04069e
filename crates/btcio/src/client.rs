//! Traits for the external chain services.

use async_trait::async_trait;
use bitcoin::{bip32::Xpub, Amount, Transaction};
use satfund_primitives::utxo::UnspentOutput;
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

/// HTTP status the broadcast service answers with when it accepts a transaction.
pub const STATUS_ACCEPTED: u16 = 200;

/// Rejection messages meaning the inputs were already consumed, typically by
/// a project's funding transaction.
const SPENT_INPUT_MARKERS: &[&str] = &[
    "missing-inputs",
    "missingorspent",
    "already spent",
    "inputs-spent",
    "bad-txns-inputs-missingorspent",
    "already in block chain",
];

/// Balance and unspent output lookups for an account.
#[async_trait]
pub trait ChainQuery: Send + Sync + 'static {
    /// Confirmed balance of every address derivable from `xpub`.
    async fn get_balance(&self, xpub: &Xpub) -> ClientResult<Amount>;

    /// Unspent outputs of `xpub`, each with its path relative to the account key.
    async fn get_unspent(&self, xpub: &Xpub) -> ClientResult<Vec<UnspentOutput>>;
}

#[async_trait]
pub trait Broadcaster: Send + Sync + 'static {
    async fn send_tx(&self, tx: &Transaction) -> ClientResult<BroadcastResponse>;
}

/// Answer of the broadcast service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub status: u16,
    pub message: String,
}

impl BroadcastResponse {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn accepted() -> Self {
        Self::new(STATUS_ACCEPTED, "Transaction Submitted")
    }

    pub fn is_accepted(&self) -> bool {
        self.status == STATUS_ACCEPTED
    }

    /// Whether the service rejected the transaction because its inputs are
    /// already spent.
    pub fn is_inputs_spent(&self) -> bool {
        if self.is_accepted() {
            return false;
        }
        let message = self.message.to_lowercase();
        SPENT_INPUT_MARKERS.iter().any(|m| message.contains(m))
    }
}
