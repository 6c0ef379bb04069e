//! Trait definitions for low level database interfaces.
//!
//! Every method that touches more than one record runs as a single atomic
//! unit: either all of its writes land or none do.

use bitcoin::Txid;
use satfund_primitives::{
    ids::{ProjectId, UserId},
    roles::DerivationRole,
};

use crate::{
    types::{
        DerivationIndices, PendingPledgeEntry, PledgeEntry, ProjectEntry, RefundJobEntry,
        RefundJobStatus, UserEntry,
    },
    DbResult,
};

/// Users and the index ledger tracking which of their keys have been handed out.
pub trait UserDatabase: Send + Sync + 'static {
    /// Registers a user, returning its new id.
    fn put_user(&self, entry: UserEntry) -> DbResult<UserId>;

    fn get_user(&self, id: UserId) -> DbResult<Option<UserEntry>>;

    /// Advances `roles` by one, provided the stored indices still equal
    /// `expected`. Otherwise fails with [`DbError::UpdateConflict`](crate::DbError)
    /// and writes nothing.
    fn bump_indices(
        &self,
        id: UserId,
        expected: DerivationIndices,
        roles: &[DerivationRole],
    ) -> DbResult<DerivationIndices>;
}

pub trait ProjectDatabase: Send + Sync + 'static {
    /// Inserts the project and advances the creator's external index in one
    /// step. The index must still equal `expected_external`, the one the
    /// payout script was derived at.
    fn create_project(
        &self,
        expected_external: u32,
        entry: ProjectEntry,
    ) -> DbResult<ProjectId>;

    fn get_project(&self, id: ProjectId) -> DbResult<Option<ProjectEntry>>;

    /// Records the accepted funding transaction. Marking an already funded
    /// project with a different txid is a conflict.
    fn mark_funded(&self, id: ProjectId, txid: Txid) -> DbResult<()>;
}

pub trait PledgeDatabase: Send + Sync + 'static {
    /// Advances the user's external and change indices from `expected` and
    /// records the in-flight pledge, atomically.
    fn begin_pledge(
        &self,
        user: UserId,
        expected: DerivationIndices,
        pending: PendingPledgeEntry,
    ) -> DbResult<DerivationIndices>;

    fn get_pending_pledge(
        &self,
        user: UserId,
        project: ProjectId,
    ) -> DbResult<Option<PendingPledgeEntry>>;

    /// Drops an in-flight pledge whose locked transaction never made it to
    /// the network. The indices it consumed stay consumed.
    fn discard_pending_pledge(&self, user: UserId, project: ProjectId) -> DbResult<()>;

    /// Stores the pledge input, adds `amount` to the project's pledged total,
    /// stores the refund job and clears the pending pledge, atomically.
    ///
    /// Returns the new pledged total and the refund job's id.
    fn finalize_pledge(
        &self,
        user: UserId,
        project: ProjectId,
        amount: u64,
        pledge: PledgeEntry,
        refund: RefundJobEntry,
    ) -> DbResult<(u64, u64)>;

    /// Pledges of a project in acceptance order.
    fn get_pledges(&self, project: ProjectId) -> DbResult<Vec<PledgeEntry>>;
}

pub trait RefundJobDatabase: Send + Sync + 'static {
    /// Inserts a new job, returning its id.
    fn put_refund_job(&self, entry: RefundJobEntry) -> DbResult<u64>;

    /// Overwrites an existing job.
    fn update_refund_job(&self, id: u64, entry: RefundJobEntry) -> DbResult<()>;

    fn get_refund_job(&self, id: u64) -> DbResult<Option<RefundJobEntry>>;

    /// Jobs currently in `status`, ordered by id.
    fn get_refund_jobs_by_status(
        &self,
        status: RefundJobStatus,
    ) -> DbResult<Vec<(u64, RefundJobEntry)>>;
}

/// Everything the pledge service needs from storage.
pub trait CampaignDatabase: UserDatabase + ProjectDatabase + PledgeDatabase + RefundJobDatabase {}

impl<T> CampaignDatabase for T where
    T: UserDatabase + ProjectDatabase + PledgeDatabase + RefundJobDatabase
{
}
