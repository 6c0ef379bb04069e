//! Sled store for the crowdfunding service.
//!
//! All records live in one [`SledBackend`] so that operations spanning
//! users, projects, pledges and refund jobs commit as a single sled
//! transaction.

mod config;
mod init;
mod pledges;
mod projects;
mod refunds;
mod users;
mod utils;

use std::{path::Path, sync::Arc};

use satfund_db_types::DbResult;

pub use crate::{config::SledDbConfig, init::open_sled_database};
use crate::utils::to_db_error;

pub const SLED_NAME: &str = "satfund";

/// Opens a complete Sled backend from datadir
pub fn open_sled_backend(
    datadir: &Path,
    dbname: &'static str,
    ops_config: SledDbConfig,
) -> anyhow::Result<Arc<SledBackend>> {
    let sled_db = open_sled_database(datadir, dbname)?;
    SledBackend::new(sled_db, ops_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize sled backend: {}", e))
        .map(Arc::new)
}

/// Sled backend implementing every campaign database trait.
#[derive(Debug)]
pub struct SledBackend {
    db: Arc<sled::Db>,
    /// `UserId -> UserEntry`
    users_tree: sled::Tree,
    /// `ProjectId -> ProjectEntry`
    projects_tree: sled::Tree,
    /// `(UserId, ProjectId) -> PendingPledgeEntry`
    pending_tree: sled::Tree,
    /// `(ProjectId, seq) -> PledgeEntry`
    pledges_tree: sled::Tree,
    /// consensus encoded `OutPoint -> ProjectId`
    pledge_outpoints_tree: sled::Tree,
    /// `job id -> RefundJobEntry`
    refund_jobs_tree: sled::Tree,
    config: SledDbConfig,
}

impl SledBackend {
    pub fn new(db: Arc<sled::Db>, config: SledDbConfig) -> DbResult<Self> {
        let open = |name: &str| db.open_tree(name).map_err(to_db_error);
        Ok(Self {
            users_tree: open("users")?,
            projects_tree: open("projects")?,
            pending_tree: open("pending_pledges")?,
            pledges_tree: open("pledges")?,
            pledge_outpoints_tree: open("pledge_outpoints")?,
            refund_jobs_tree: open("refund_jobs")?,
            db,
            config,
        })
    }

    /// Monotonic id shared by every record kind.
    fn next_id(&self) -> DbResult<u64> {
        self.db.generate_id().map_err(to_db_error)
    }

    /// Flushes dirty buffers to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush().map_err(to_db_error)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::Arc;

    use bitcoin::{
        absolute,
        bip32::{Xpriv, Xpub},
        hashes::Hash,
        secp256k1::Secp256k1,
        transaction::Version,
        Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
    };
    use satfund_db_types::types::{ProjectEntry, UserEntry};
    use satfund_primitives::{ids::UserId, pledge::PledgeInput, secret::SecretToken};

    use super::*;

    pub(crate) fn get_backend() -> SledBackend {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .expect("open temporary sled db");
        SledBackend::new(Arc::new(db), SledDbConfig::test()).expect("open trees")
    }

    pub(crate) fn sample_xpub() -> Xpub {
        let xpriv = Xpriv::new_master(Network::Regtest, &[1u8; 32]).expect("valid seed");
        Xpub::from_priv(&Secp256k1::new(), &xpriv)
    }

    pub(crate) fn sample_user() -> UserEntry {
        UserEntry::new(&sample_xpub())
    }

    pub(crate) fn sample_project(creator: UserId) -> ProjectEntry {
        ProjectEntry::new(
            creator,
            "community garden".to_string(),
            ScriptBuf::from_bytes(vec![0x76, 0xa9, 0x14]),
            Amount::from_sat(500_000),
            1_800_000_000,
            SecretToken::new([7u8; 32]),
        )
    }

    pub(crate) fn sample_tx(lock_time: u32) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: absolute::LockTime::from_consensus(lock_time),
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::all_zeros(), 0),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_LOCKTIME_NO_RBF,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(90_000),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    pub(crate) fn sample_pledge_input(vout: u32, value: u64) -> PledgeInput {
        PledgeInput {
            prev_txid: Txid::from_byte_array([3u8; 32]),
            output_index: vout,
            sequence: Sequence::MAX,
            script_sig: ScriptBuf::from_bytes(vec![0x51]),
            output: TxOut {
                value: Amount::from_sat(value),
                script_pubkey: ScriptBuf::from_bytes(vec![0xa9, 0x14]),
            },
        }
    }
}
