use bitcoin::Txid;
use satfund_db_types::{
    traits::ProjectDatabase,
    types::{DerivationIndices, ProjectEntry, ProjectStatus, UserEntry},
    DbError, DbResult,
};
use satfund_primitives::{ids::ProjectId, roles::DerivationRole};
use sled::transaction::ConflictableTransactionError;
use tracing::{debug, info};

use crate::{
    users::check_and_bump,
    utils::{abort, get_decoded, tx_get, tx_put},
    SledBackend,
};

impl ProjectDatabase for SledBackend {
    fn create_project(&self, expected_external: u32, entry: ProjectEntry) -> DbResult<ProjectId> {
        let id = ProjectId::new(self.next_id()?);
        let creator = entry.creator;
        let creator_key = creator.to_be_bytes();
        let project_key = id.to_be_bytes();

        self.config.with_retry(
            (&self.users_tree, &self.projects_tree),
            |(users, projects)| {
                let Some(mut user) = tx_get::<UserEntry>(users, &creator_key)? else {
                    return abort(DbError::NonExistentEntry);
                };
                // Only the external index is compared; the change index
                // may move concurrently without affecting the payout script.
                let expected = DerivationIndices::new(expected_external, user.indices.change);
                user.indices =
                    check_and_bump(creator, user.indices, expected, &[DerivationRole::External])
                        .map_err(ConflictableTransactionError::Abort)?;
                tx_put(users, &creator_key, &user)?;
                tx_put(projects, &project_key, &entry)?;
                Ok(())
            },
        )?;

        info!(%id, %creator, fund_goal = entry.fund_goal, "created project");
        Ok(id)
    }

    fn get_project(&self, id: ProjectId) -> DbResult<Option<ProjectEntry>> {
        get_decoded(&self.projects_tree, &id.to_be_bytes())
    }

    fn mark_funded(&self, id: ProjectId, txid: Txid) -> DbResult<()> {
        let key = id.to_be_bytes();
        self.config.with_retry(&self.projects_tree, |projects| {
            let Some(mut project) = tx_get::<ProjectEntry>(projects, &key)? else {
                return abort(DbError::NonExistentEntry);
            };
            match project.status.funding_txid() {
                Some(existing) if existing == txid => return Ok(()),
                Some(existing) => {
                    return abort(DbError::UpdateConflict(format!(
                        "{id} already funded by {existing}"
                    )))
                }
                None => {}
            }
            project.status = ProjectStatus::funded(txid);
            tx_put(projects, &key, &project)?;
            Ok(())
        })?;

        debug!(%id, %txid, "marked project funded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;
    use satfund_db_types::traits::UserDatabase;
    use satfund_primitives::ids::UserId;

    use super::*;
    use crate::test_utils::{get_backend, sample_project, sample_user};

    #[test]
    fn test_create_project_bumps_creator_external_index() {
        let db = get_backend();
        let creator = db.put_user(sample_user()).unwrap();

        let id = db.create_project(0, sample_project(creator)).unwrap();

        let project = db.get_project(id).unwrap().unwrap();
        assert_eq!(project, sample_project(creator));
        assert_eq!(project.status, ProjectStatus::Open);
        assert_eq!(
            db.get_user(creator).unwrap().unwrap().indices,
            DerivationIndices::new(1, 0)
        );
    }

    #[test]
    fn test_create_project_with_stale_index_is_rolled_back() {
        let db = get_backend();
        let creator = db.put_user(sample_user()).unwrap();
        db.create_project(0, sample_project(creator)).unwrap();

        let err = db.create_project(0, sample_project(creator)).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            db.get_user(creator).unwrap().unwrap().indices,
            DerivationIndices::new(1, 0)
        );
    }

    #[test]
    fn test_create_project_unknown_creator() {
        let db = get_backend();
        let err = db
            .create_project(0, sample_project(UserId::new(99)))
            .unwrap_err();
        assert_eq!(err, DbError::NonExistentEntry);
    }

    #[test]
    fn test_mark_funded_is_idempotent() {
        let db = get_backend();
        let creator = db.put_user(sample_user()).unwrap();
        let id = db.create_project(0, sample_project(creator)).unwrap();
        let txid = Txid::from_byte_array([5u8; 32]);

        db.mark_funded(id, txid).unwrap();
        db.mark_funded(id, txid).unwrap();
        assert_eq!(
            db.get_project(id).unwrap().unwrap().status.funding_txid(),
            Some(txid)
        );

        let err = db
            .mark_funded(id, Txid::from_byte_array([6u8; 32]))
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
