//! Wire types of the three-stage pledge exchange.
//!
//! Requests and responses are tagged by `stage`. Transactions and inputs
//! travel as hex encoded consensus bytes.

use bitcoin::{
    consensus::{deserialize, encode::serialize_hex, Decodable},
    hashes::hash160,
    Transaction, TxIn, Txid,
};
use satfund_primitives::{secret::SecretToken, utxo::UnspentOutput};
use serde::{Deserialize, Serialize};

use crate::errors::{PledgeError, PledgeResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "camelCase")]
pub enum PledgeRequest {
    /// Ask for inputs covering `amount` plus the fee.
    Initial { amount: u64 },

    /// Hand over the signed locking transaction and its refund.
    TransmitExactAmount {
        serialized_tx: String,
        refund_tx: String,
    },

    /// Hand over the signed input spending the locked output to the project.
    TransmitPartial {
        input: String,
        amount: u64,
        refund_tx: String,
    },
}

impl PledgeRequest {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Initial { .. } => STAGE_INITIAL,
            Self::TransmitExactAmount { .. } => STAGE_TRANSMIT_EXACT_AMOUNT,
            Self::TransmitPartial { .. } => STAGE_TRANSMIT_PARTIAL,
        }
    }

    pub fn transmit_exact_amount(locked_tx: &Transaction, refund_tx: &Transaction) -> Self {
        Self::TransmitExactAmount {
            serialized_tx: serialize_hex(locked_tx),
            refund_tx: serialize_hex(refund_tx),
        }
    }

    pub fn transmit_partial(input: &TxIn, amount: u64, refund_tx: &Transaction) -> Self {
        Self::TransmitPartial {
            input: serialize_hex(input),
            amount,
            refund_tx: serialize_hex(refund_tx),
        }
    }
}

pub const STAGE_INITIAL: &str = "initial";
pub const STAGE_TRANSMIT_EXACT_AMOUNT: &str = "transmitExactAmount";
pub const STAGE_TRANSMIT_PARTIAL: &str = "transmitPartial";

/// Everything the pledger needs to build and sign the locking transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialResponse {
    pub inputs: Vec<UnspentOutput>,
    pub secret_hash: hash160::Hash,
    /// Project deadline, unix seconds.
    pub deadline: u64,
    /// Contract lock time, equal to the deadline.
    pub lock_time: u32,
    /// Lock time the refund transaction must carry.
    pub refund_lock_time: u32,
    /// Index of the key the contract output commits to.
    pub external_index: u32,
    /// Index of the change key.
    pub change_index: u32,
    pub min_fee: u64,
}

/// What the pledger needs to sign its partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitExactAmountResponse {
    pub address: String,
    pub fund_goal: u64,
    pub secret: SecretToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PartialStatus {
    /// Stored, the goal is not reached yet.
    Submitted,

    /// The project's funding transaction has been broadcast.
    Funded { txid: Txid },

    /// Stored and the goal is reached, but building or broadcasting the
    /// funding transaction failed. `kind` is the [`PledgeError::kind`] of the
    /// failure.
    AggregationFailed { kind: String, message: String },
}

impl PartialStatus {
    pub fn aggregation_failed(err: &PledgeError) -> Self {
        Self::AggregationFailed {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "camelCase")]
pub enum PledgeResponse {
    Initial(InitialResponse),
    TransmitExactAmount(TransmitExactAmountResponse),
    TransmitPartial(PartialStatus),
}

pub(crate) fn decode_hex<T: Decodable>(what: &str, raw: &str) -> PledgeResult<T> {
    let bytes = hex::decode(raw.trim())
        .map_err(|e| PledgeError::malformed(format!("{what}: invalid hex: {e}")))?;
    deserialize(&bytes).map_err(|e| PledgeError::malformed(format!("{what}: {e}")))
}
