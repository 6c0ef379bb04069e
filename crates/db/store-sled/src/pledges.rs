use bitcoin::consensus::serialize;
use satfund_db_types::{
    traits::PledgeDatabase,
    types::{DerivationIndices, PendingPledgeEntry, PledgeEntry, ProjectEntry, RefundJobEntry, UserEntry},
    DbError, DbResult,
};
use satfund_primitives::{
    ids::{ProjectId, UserId},
    roles::DerivationRole,
};
use sled::transaction::ConflictableTransactionError;
use tracing::{debug, info};

use crate::{
    users::check_and_bump,
    utils::{abort, decode, encode, get_decoded, pending_key, pledge_key, to_db_error, tx_get, tx_put},
    SledBackend,
};

impl PledgeDatabase for SledBackend {
    fn begin_pledge(
        &self,
        user: UserId,
        expected: DerivationIndices,
        pending: PendingPledgeEntry,
    ) -> DbResult<DerivationIndices> {
        let user_key = user.to_be_bytes();
        let project_key = pending.project_id.to_be_bytes();
        let key = pending_key(user, pending.project_id);

        let next = self.config.with_retry(
            (&self.users_tree, &self.projects_tree, &self.pending_tree),
            |(users, projects, pendings)| {
                if projects.get(project_key)?.is_none() {
                    return abort(DbError::NonExistentEntry);
                }
                let Some(mut entry) = tx_get::<UserEntry>(users, &user_key)? else {
                    return abort(DbError::NonExistentEntry);
                };
                entry.indices = check_and_bump(
                    user,
                    entry.indices,
                    expected,
                    &[DerivationRole::External, DerivationRole::Change],
                )
                .map_err(ConflictableTransactionError::Abort)?;
                tx_put(users, &user_key, &entry)?;
                tx_put(pendings, &key, &pending)?;
                Ok(entry.indices)
            },
        )?;

        debug!(%user, project = %pending.project_id, ?next, "began pledge");
        Ok(next)
    }

    fn get_pending_pledge(
        &self,
        user: UserId,
        project: ProjectId,
    ) -> DbResult<Option<PendingPledgeEntry>> {
        get_decoded(&self.pending_tree, &pending_key(user, project))
    }

    fn discard_pending_pledge(&self, user: UserId, project: ProjectId) -> DbResult<()> {
        self.pending_tree
            .remove(pending_key(user, project))
            .map_err(to_db_error)?;
        debug!(%user, %project, "discarded pending pledge");
        Ok(())
    }

    fn finalize_pledge(
        &self,
        user: UserId,
        project: ProjectId,
        amount: u64,
        pledge: PledgeEntry,
        refund: RefundJobEntry,
    ) -> DbResult<(u64, u64)> {
        let outpoint = pledge
            .try_to_pledge_input()
            .map_err(|e| DbError::CodecError(e.to_string()))?
            .outpoint();
        let outpoint_key = serialize(&outpoint);
        let project_key = project.to_be_bytes();
        let pending = pending_key(user, project);
        let seq = self.next_id()?;
        let job_id = self.next_id()?;
        let pledge_raw = encode(&pledge)?;
        let refund_raw = encode(&refund)?;

        let total = self.config.with_retry(
            (
                &self.projects_tree,
                &self.pending_tree,
                &self.pledges_tree,
                &self.pledge_outpoints_tree,
                &self.refund_jobs_tree,
            ),
            |(projects, pendings, pledges, outpoints, jobs)| {
                match tx_get::<PendingPledgeEntry>(pendings, &pending)? {
                    Some(p) if p.project_id == project => {}
                    _ => return abort(DbError::NonExistentEntry),
                }
                if outpoints.get(outpoint_key.as_slice())?.is_some() {
                    return abort(DbError::EntryAlreadyExists);
                }
                let Some(mut entry) = tx_get::<ProjectEntry>(projects, &project_key)? else {
                    return abort(DbError::NonExistentEntry);
                };
                let Some(total) = entry.amount_pledged.checked_add(amount) else {
                    return abort(DbError::Other(format!("{project} pledged total overflows")));
                };
                entry.amount_pledged = total;

                tx_put(projects, &project_key, &entry)?;
                pledges.insert(&pledge_key(project, seq)[..], pledge_raw.clone())?;
                outpoints.insert(outpoint_key.as_slice(), &project_key[..])?;
                jobs.insert(&job_id.to_be_bytes()[..], refund_raw.clone())?;
                pendings.remove(&pending[..])?;
                Ok(total)
            },
        )?;

        info!(%user, %project, %amount, %total, %outpoint, "accepted pledge");
        Ok((total, job_id))
    }

    fn get_pledges(&self, project: ProjectId) -> DbResult<Vec<PledgeEntry>> {
        self.pledges_tree
            .scan_prefix(project.to_be_bytes())
            .map(|item| {
                let (_, raw) = item.map_err(to_db_error)?;
                decode(&raw)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::Amount;
    use satfund_db_types::{
        traits::{ProjectDatabase, RefundJobDatabase, UserDatabase},
        types::RefundJobStatus,
    };

    use super::*;
    use crate::test_utils::{get_backend, sample_pledge_input, sample_project, sample_tx, sample_user};

    fn setup(db: &SledBackend) -> (UserId, ProjectId) {
        let creator = db.put_user(sample_user()).unwrap();
        let project = db.create_project(0, sample_project(creator)).unwrap();
        let pledger = db.put_user(sample_user()).unwrap();
        (pledger, project)
    }

    fn pending_for(project: ProjectId, amount: u64) -> PendingPledgeEntry {
        PendingPledgeEntry::new(
            project,
            Amount::from_sat(amount),
            DerivationIndices::default(),
            &sample_tx(0),
            &sample_tx(1_800_003_600),
        )
    }

    fn refund_for(project: ProjectId) -> RefundJobEntry {
        RefundJobEntry::new(Some(project), &sample_tx(1_800_003_600), 1_800_003_600, 0)
    }

    #[test]
    fn test_begin_pledge_bumps_both_roles() {
        let db = get_backend();
        let (user, project) = setup(&db);

        let next = db
            .begin_pledge(user, DerivationIndices::default(), pending_for(project, 200_000))
            .unwrap();
        assert_eq!(next, DerivationIndices::new(1, 1));
        assert_eq!(db.get_user(user).unwrap().unwrap().indices, next);
        assert_eq!(
            db.get_pending_pledge(user, project).unwrap(),
            Some(pending_for(project, 200_000))
        );
    }

    #[test]
    fn test_begin_pledge_conflict_writes_nothing() {
        let db = get_backend();
        let (user, project) = setup(&db);

        let err = db
            .begin_pledge(user, DerivationIndices::new(3, 0), pending_for(project, 200_000))
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            db.get_user(user).unwrap().unwrap().indices,
            DerivationIndices::default()
        );
        assert!(db.get_pending_pledge(user, project).unwrap().is_none());
    }

    #[test]
    fn test_begin_pledge_unknown_project() {
        let db = get_backend();
        let (user, _) = setup(&db);
        let err = db
            .begin_pledge(
                user,
                DerivationIndices::default(),
                pending_for(ProjectId::new(12345), 1),
            )
            .unwrap_err();
        assert_eq!(err, DbError::NonExistentEntry);
    }

    #[test]
    fn test_discard_keeps_indices() {
        let db = get_backend();
        let (user, project) = setup(&db);
        db.begin_pledge(user, DerivationIndices::default(), pending_for(project, 1_000))
            .unwrap();

        db.discard_pending_pledge(user, project).unwrap();

        assert!(db.get_pending_pledge(user, project).unwrap().is_none());
        assert_eq!(
            db.get_user(user).unwrap().unwrap().indices,
            DerivationIndices::new(1, 1)
        );
    }

    #[test]
    fn test_finalize_pledge_is_atomic() {
        let db = get_backend();
        let (user, project) = setup(&db);
        db.begin_pledge(user, DerivationIndices::default(), pending_for(project, 200_000))
            .unwrap();

        let input = sample_pledge_input(0, 200_000);
        let (total, job_id) = db
            .finalize_pledge(
                user,
                project,
                200_000,
                PledgeEntry::new(user, &input),
                refund_for(project),
            )
            .unwrap();

        assert_eq!(total, 200_000);
        assert_eq!(db.get_project(project).unwrap().unwrap().amount_pledged, 200_000);
        assert!(db.get_pending_pledge(user, project).unwrap().is_none());

        let pledges = db.get_pledges(project).unwrap();
        assert_eq!(pledges.len(), 1);
        assert_eq!(pledges[0].try_to_pledge_input().unwrap(), input);

        let job = db.get_refund_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, RefundJobStatus::Scheduled);
        assert_eq!(job.project_id, Some(project));
    }

    #[test]
    fn test_finalize_without_pending_writes_nothing() {
        let db = get_backend();
        let (user, project) = setup(&db);

        let err = db
            .finalize_pledge(
                user,
                project,
                200_000,
                PledgeEntry::new(user, &sample_pledge_input(0, 200_000)),
                refund_for(project),
            )
            .unwrap_err();
        assert_eq!(err, DbError::NonExistentEntry);
        assert_eq!(db.get_project(project).unwrap().unwrap().amount_pledged, 0);
        assert!(db.get_pledges(project).unwrap().is_empty());
        assert!(db
            .get_refund_jobs_by_status(RefundJobStatus::Scheduled)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_duplicate_outpoint_rejected() {
        let db = get_backend();
        let (user, project) = setup(&db);
        let input = sample_pledge_input(0, 100_000);

        db.begin_pledge(user, DerivationIndices::default(), pending_for(project, 100_000))
            .unwrap();
        db.finalize_pledge(
            user,
            project,
            100_000,
            PledgeEntry::new(user, &input),
            refund_for(project),
        )
        .unwrap();

        db.begin_pledge(user, DerivationIndices::new(1, 1), pending_for(project, 100_000))
            .unwrap();
        let err = db
            .finalize_pledge(
                user,
                project,
                100_000,
                PledgeEntry::new(user, &input),
                refund_for(project),
            )
            .unwrap_err();
        assert_eq!(err, DbError::EntryAlreadyExists);
        assert_eq!(db.get_project(project).unwrap().unwrap().amount_pledged, 100_000);
        // The pending pledge survives the rollback.
        assert!(db.get_pending_pledge(user, project).unwrap().is_some());
    }

    #[test]
    fn test_pledges_listed_in_acceptance_order() {
        let db = get_backend();
        let (user, project) = setup(&db);
        let mut indices = DerivationIndices::default();

        for vout in [2u32, 0, 1] {
            indices = db
                .begin_pledge(user, indices, pending_for(project, 50_000))
                .unwrap();
            db.finalize_pledge(
                user,
                project,
                50_000,
                PledgeEntry::new(user, &sample_pledge_input(vout, 50_000)),
                refund_for(project),
            )
            .unwrap();
        }

        let vouts: Vec<u32> = db
            .get_pledges(project)
            .unwrap()
            .iter()
            .map(|p| p.try_to_pledge_input().unwrap().output_index)
            .collect();
        assert_eq!(vouts, vec![2, 0, 1]);
        assert_eq!(db.get_project(project).unwrap().unwrap().amount_pledged, 150_000);
    }
}
