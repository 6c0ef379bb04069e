//! Module for database local types

use std::str::FromStr;

use bitcoin::{
    bip32::{self, Xpub},
    consensus::{self, deserialize, serialize},
    hashes::Hash,
    Amount, ScriptBuf, Transaction, TxIn, TxOut, Txid,
};
use borsh::{BorshDeserialize, BorshSerialize};
use satfund_primitives::{
    ids::{ProjectId, UserId},
    pledge::PledgeInput,
    roles::DerivationRole,
    secret::SecretToken,
};
use serde::{Deserialize, Serialize};

/// Next unused derivation index of each role for one user.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct DerivationIndices {
    pub external: u32,
    pub change: u32,
}

impl DerivationIndices {
    pub fn new(external: u32, change: u32) -> Self {
        Self { external, change }
    }

    pub fn get(&self, role: DerivationRole) -> u32 {
        match role {
            DerivationRole::External => self.external,
            DerivationRole::Change => self.change,
        }
    }

    /// Indices with every role in `roles` advanced by one, or `None` if any
    /// would leave the `u32` range.
    pub fn bumped(&self, roles: &[DerivationRole]) -> Option<Self> {
        let mut next = *self;
        for role in roles {
            match role {
                DerivationRole::External => next.external = next.external.checked_add(1)?,
                DerivationRole::Change => next.change = next.change.checked_add(1)?,
            }
        }
        Some(next)
    }
}

/// A registered user. Only the account xpub is known to the server.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct UserEntry {
    /// Base58 encoded account xpub.
    xpub: String,
    pub indices: DerivationIndices,
}

impl UserEntry {
    pub fn new(xpub: &Xpub) -> Self {
        Self {
            xpub: xpub.to_string(),
            indices: DerivationIndices::default(),
        }
    }

    pub fn try_to_xpub(&self) -> Result<Xpub, bip32::Error> {
        Xpub::from_str(&self.xpub)
    }
}

/// Funding state of a project.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
#[serde(tag = "status")]
pub enum ProjectStatus {
    /// Still collecting pledges.
    Open,

    /// The funding transaction with the given id has been accepted for broadcast.
    Funded { txid: [u8; 32] },
}

impl ProjectStatus {
    pub fn funded(txid: Txid) -> Self {
        Self::Funded {
            txid: txid.to_byte_array(),
        }
    }

    pub fn funding_txid(&self) -> Option<Txid> {
        match self {
            Self::Open => None,
            Self::Funded { txid } => Some(Txid::from_byte_array(*txid)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ProjectEntry {
    pub creator: UserId,
    pub title: String,
    /// `script_pubkey` the funding transaction pays to.
    payout_script: Vec<u8>,
    pub fund_goal: u64,
    /// Sum of all accepted pledges. Only grows.
    pub amount_pledged: u64,
    /// Unix seconds after which pledges may be refunded.
    pub deadline: u64,
    pub secret: SecretToken,
    pub status: ProjectStatus,
}

impl ProjectEntry {
    pub fn new(
        creator: UserId,
        title: String,
        payout_script: ScriptBuf,
        fund_goal: Amount,
        deadline: u64,
        secret: SecretToken,
    ) -> Self {
        Self {
            creator,
            title,
            payout_script: payout_script.into_bytes(),
            fund_goal: fund_goal.to_sat(),
            amount_pledged: 0,
            deadline,
            secret,
            status: ProjectStatus::Open,
        }
    }

    pub fn payout_script(&self) -> ScriptBuf {
        ScriptBuf::from_bytes(self.payout_script.clone())
    }

    pub fn fund_goal(&self) -> Amount {
        Amount::from_sat(self.fund_goal)
    }

    pub fn amount_pledged(&self) -> Amount {
        Amount::from_sat(self.amount_pledged)
    }

    pub fn is_funded(&self) -> bool {
        matches!(self.status, ProjectStatus::Funded { .. })
    }
}

/// A pledge between locking its funds and handing over its partial.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PendingPledgeEntry {
    pub project_id: ProjectId,
    pub amount: u64,
    /// Indices the pledge consumed.
    pub indices: DerivationIndices,
    locked_tx_raw: Vec<u8>,
    refund_tx_raw: Vec<u8>,
}

impl PendingPledgeEntry {
    pub fn new(
        project_id: ProjectId,
        amount: Amount,
        indices: DerivationIndices,
        locked_tx: &Transaction,
        refund_tx: &Transaction,
    ) -> Self {
        Self {
            project_id,
            amount: amount.to_sat(),
            indices,
            locked_tx_raw: serialize(locked_tx),
            refund_tx_raw: serialize(refund_tx),
        }
    }

    pub fn try_to_locked_tx(&self) -> Result<Transaction, consensus::encode::Error> {
        deserialize(&self.locked_tx_raw)
    }

    pub fn try_to_refund_tx(&self) -> Result<Transaction, consensus::encode::Error> {
        deserialize(&self.refund_tx_raw)
    }
}

/// An accepted pledge input.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PledgeEntry {
    pub user_id: UserId,
    /// Consensus encoded [`TxIn`] carrying the pledger's signature.
    txin_raw: Vec<u8>,
    /// Consensus encoded contract [`TxOut`] being spent.
    prevout_raw: Vec<u8>,
}

impl PledgeEntry {
    pub fn new(user_id: UserId, input: &PledgeInput) -> Self {
        Self {
            user_id,
            txin_raw: serialize(&input.to_txin()),
            prevout_raw: serialize(&input.output),
        }
    }

    pub fn try_to_pledge_input(&self) -> Result<PledgeInput, consensus::encode::Error> {
        let txin: TxIn = deserialize(&self.txin_raw)?;
        let output: TxOut = deserialize(&self.prevout_raw)?;
        Ok(PledgeInput::from_txin(&txin, output))
    }
}

/// Lifecycle of a scheduled refund broadcast.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
#[serde(tag = "status")]
pub enum RefundJobStatus {
    /// Waiting for its fire time.
    Scheduled,

    /// Handed to the broadcaster, outcome not yet recorded.
    Broadcasting,

    /// Accepted, or found to be spent by the funding transaction.
    Done,

    /// Retries exhausted.
    Failed,
}

impl RefundJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RefundJobEntry {
    pub project_id: Option<ProjectId>,
    /// Raw serialized transaction. This is `consensus::serialize()` of [`Transaction`].
    tx_raw: Vec<u8>,
    /// Unix seconds at which to broadcast.
    pub fire_time: u64,
    pub retry_count: u32,
    pub status: RefundJobStatus,
}

impl RefundJobEntry {
    pub fn new(
        project_id: Option<ProjectId>,
        tx: &Transaction,
        fire_time: u64,
        retry_count: u32,
    ) -> Self {
        Self {
            project_id,
            tx_raw: serialize(tx),
            fire_time,
            retry_count,
            status: RefundJobStatus::Scheduled,
        }
    }

    pub fn tx_raw(&self) -> &[u8] {
        &self.tx_raw
    }

    pub fn try_to_tx(&self) -> Result<Transaction, consensus::encode::Error> {
        deserialize(&self.tx_raw)
    }
}
