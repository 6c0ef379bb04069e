//! Users and projects.

use bitcoin::{bip32::Xpub, hashes::hash160, Address, Amount, Network, Txid};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rand::{CryptoRng, RngCore};
use satfund_db_types::{
    traits::{ProjectDatabase, UserDatabase},
    types::{ProjectEntry, UserEntry},
};
use satfund_key_derivation::KeyError;
use satfund_primitives::{
    ids::{ProjectId, UserId},
    secret::SecretToken,
    time::{to_network_lock_time, Clock},
};
use serde::{Deserialize, Serialize};
use tracing::*;

use crate::{
    errors::{PledgeError, PledgeResult},
    validate::external_key_hash,
};

/// Registers an account xpub. The user starts at index 0 for both roles.
pub fn register_user<D: UserDatabase + ?Sized>(db: &D, xpub: &Xpub) -> PledgeResult<UserId> {
    let id = db.put_user(UserEntry::new(xpub))?;
    info!(user = %id, %xpub, "registered user");
    Ok(id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub creator: UserId,
    pub title: String,
    pub fund_goal: Amount,
    pub deadline: DateTime<Utc>,
}

/// Creates a project paying out to the creator's next external address.
///
/// The payout address consumes that index; if another operation consumed it
/// first the creation fails with [`PledgeError::UpdateConflict`].
pub fn create_project<D, R>(
    db: &D,
    clock: &dyn Clock,
    network: Network,
    project: NewProject,
    rng: &mut R,
) -> PledgeResult<ProjectId>
where
    D: UserDatabase + ProjectDatabase + ?Sized,
    R: RngCore + CryptoRng,
{
    let title = project.title.trim();
    if title.is_empty() {
        return Err(PledgeError::malformed("project title is empty"));
    }
    if project.fund_goal == Amount::ZERO {
        return Err(PledgeError::malformed("funding goal must be positive"));
    }
    let deadline = u64::try_from(project.deadline.timestamp())
        .map_err(|_| PledgeError::malformed("deadline before the unix epoch"))?;
    let now = clock.now();
    if deadline <= now {
        return Err(PledgeError::malformed(format!(
            "deadline {} is not in the future",
            project.deadline
        )));
    }
    to_network_lock_time(deadline)?;

    let user = db
        .get_user(project.creator)?
        .ok_or(PledgeError::UnknownUser(project.creator))?;
    let xpub = user.try_to_xpub().map_err(KeyError::from)?;
    let index = user.indices.external;
    let payout = Address::p2pkh(external_key_hash(&xpub, index)?, network);

    let entry = ProjectEntry::new(
        project.creator,
        title.to_string(),
        payout.script_pubkey(),
        project.fund_goal,
        deadline,
        SecretToken::generate(rng),
    );
    let id = db.create_project(index, entry)?;

    info!(
        project = %id,
        creator = %project.creator,
        %payout,
        fund_goal = %project.fund_goal,
        %deadline,
        "created project"
    );
    Ok(id)
}

/// Parses a deadline given as RFC 3339 or as a plain `YYYY-MM-DD` date,
/// the latter meaning midnight UTC.
pub fn parse_deadline(raw: &str) -> PledgeResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| PledgeError::malformed(format!("deadline {raw:?}: {e}")))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| PledgeError::malformed(format!("deadline {raw:?}: no midnight")))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

/// Public view of a project. The secret is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: ProjectId,
    pub creator: UserId,
    pub title: String,
    pub address: String,
    pub fund_goal: u64,
    pub amount_pledged: u64,
    pub deadline: u64,
    pub secret_hash: hash160::Hash,
    pub funding_txid: Option<Txid>,
}

pub fn get_project_info<D: ProjectDatabase + ?Sized>(
    db: &D,
    id: ProjectId,
    network: Network,
) -> PledgeResult<ProjectInfo> {
    let entry = db.get_project(id)?.ok_or(PledgeError::UnknownProject(id))?;
    let address = Address::from_script(&entry.payout_script(), network)
        .map(|a| a.to_string())
        .unwrap_or_else(|_| entry.payout_script().to_hex_string());
    Ok(ProjectInfo {
        id,
        creator: entry.creator,
        address,
        fund_goal: entry.fund_goal,
        amount_pledged: entry.amount_pledged,
        deadline: entry.deadline,
        secret_hash: entry.secret.hash(),
        funding_txid: entry.status.funding_txid(),
        title: entry.title,
    })
}
