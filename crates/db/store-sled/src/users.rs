use satfund_db_types::{
    traits::UserDatabase,
    types::{DerivationIndices, UserEntry},
    DbError, DbResult,
};
use satfund_primitives::{ids::UserId, roles::DerivationRole};
use sled::transaction::ConflictableTransactionError;
use tracing::debug;

use crate::{
    utils::{abort, get_decoded, put_encoded, tx_get, tx_put},
    SledBackend,
};

/// Checks the compare-and-swap precondition on a user's indices and returns
/// the advanced indices.
pub(crate) fn check_and_bump(
    user: UserId,
    stored: DerivationIndices,
    expected: DerivationIndices,
    roles: &[DerivationRole],
) -> DbResult<DerivationIndices> {
    if stored != expected {
        return Err(DbError::UpdateConflict(format!(
            "{user} indices are {stored:?}, expected {expected:?}"
        )));
    }
    stored.bumped(roles).ok_or(DbError::IndexExhausted)
}

impl UserDatabase for SledBackend {
    fn put_user(&self, entry: UserEntry) -> DbResult<UserId> {
        let id = UserId::new(self.next_id()?);
        put_encoded(&self.users_tree, &id.to_be_bytes(), &entry)?;
        debug!(%id, "registered user");
        Ok(id)
    }

    fn get_user(&self, id: UserId) -> DbResult<Option<UserEntry>> {
        get_decoded(&self.users_tree, &id.to_be_bytes())
    }

    fn bump_indices(
        &self,
        id: UserId,
        expected: DerivationIndices,
        roles: &[DerivationRole],
    ) -> DbResult<DerivationIndices> {
        let key = id.to_be_bytes();
        self.config.with_retry(&self.users_tree, |users| {
            let Some(mut user) = tx_get::<UserEntry>(users, &key)? else {
                return abort(DbError::NonExistentEntry);
            };
            let next = check_and_bump(id, user.indices, expected, roles)
                .map_err(ConflictableTransactionError::Abort)?;
            user.indices = next;
            tx_put(users, &key, &user)?;
            Ok(next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{get_backend, sample_user, sample_xpub};

    #[test]
    fn test_put_and_get_user() {
        let db = get_backend();
        let id = db.put_user(sample_user()).unwrap();

        let user = db.get_user(id).unwrap().unwrap();
        assert_eq!(user.try_to_xpub().unwrap(), sample_xpub());
        assert_eq!(user.indices, DerivationIndices::default());

        assert!(db.get_user(UserId::new(id.inner() + 1000)).unwrap().is_none());
    }

    #[test]
    fn test_bump_indices() {
        let db = get_backend();
        let id = db.put_user(sample_user()).unwrap();

        let next = db
            .bump_indices(
                id,
                DerivationIndices::default(),
                &[DerivationRole::External, DerivationRole::Change],
            )
            .unwrap();
        assert_eq!(next, DerivationIndices::new(1, 1));

        let next = db
            .bump_indices(id, next, &[DerivationRole::External])
            .unwrap();
        assert_eq!(next, DerivationIndices::new(2, 1));
        assert_eq!(db.get_user(id).unwrap().unwrap().indices, next);
    }

    #[test]
    fn test_stale_indices_conflict_and_write_nothing() {
        let db = get_backend();
        let id = db.put_user(sample_user()).unwrap();
        let start = DerivationIndices::default();

        db.bump_indices(id, start, &[DerivationRole::External])
            .unwrap();
        // A second caller that derived from the same snapshot loses.
        let err = db
            .bump_indices(id, start, &[DerivationRole::External])
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            db.get_user(id).unwrap().unwrap().indices,
            DerivationIndices::new(1, 0)
        );
    }

    #[test]
    fn test_bump_missing_user() {
        let db = get_backend();
        let err = db
            .bump_indices(
                UserId::new(42),
                DerivationIndices::default(),
                &[DerivationRole::Change],
            )
            .unwrap_err();
        assert_eq!(err, DbError::NonExistentEntry);
    }

    #[test]
    fn test_check_and_bump_exhausted() {
        let stored = DerivationIndices::new(u32::MAX, 0);
        let err =
            check_and_bump(UserId::new(1), stored, stored, &[DerivationRole::External]).unwrap_err();
        assert_eq!(err, DbError::IndexExhausted);
    }
}
