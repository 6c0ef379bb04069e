use borsh::{BorshDeserialize, BorshSerialize};
use satfund_db_types::{DbError, DbResult};
use satfund_primitives::ids::{ProjectId, UserId};
use sled::{
    transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree},
    Tree,
};

pub(crate) fn to_db_error(err: sled::Error) -> DbError {
    match err {
        sled::Error::Io(e) => DbError::IoError(e.to_string()),
        other => DbError::Other(other.to_string()),
    }
}

pub(crate) fn encode<T: BorshSerialize>(value: &T) -> DbResult<Vec<u8>> {
    borsh::to_vec(value).map_err(|e| DbError::CodecError(e.to_string()))
}

pub(crate) fn decode<T: BorshDeserialize>(raw: &[u8]) -> DbResult<T> {
    T::try_from_slice(raw).map_err(|e| DbError::CodecError(e.to_string()))
}

/// Aborts the surrounding transaction with `err`.
pub(crate) fn abort<T>(err: DbError) -> ConflictableTransactionResult<T, DbError> {
    Err(ConflictableTransactionError::Abort(err))
}

pub(crate) fn get_decoded<T: BorshDeserialize>(tree: &Tree, key: &[u8]) -> DbResult<Option<T>> {
    match tree.get(key).map_err(to_db_error)? {
        Some(raw) => decode(&raw).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn put_encoded<T: BorshSerialize>(tree: &Tree, key: &[u8], value: &T) -> DbResult<()> {
    tree.insert(key, encode(value)?).map_err(to_db_error)?;
    Ok(())
}

pub(crate) fn tx_get<T: BorshDeserialize>(
    tree: &TransactionalTree,
    key: &[u8],
) -> ConflictableTransactionResult<Option<T>, DbError> {
    match tree.get(key)? {
        Some(raw) => decode(&raw)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

pub(crate) fn tx_put<T: BorshSerialize>(
    tree: &TransactionalTree,
    key: &[u8],
    value: &T,
) -> ConflictableTransactionResult<(), DbError> {
    let raw = encode(value).map_err(ConflictableTransactionError::Abort)?;
    tree.insert(key, raw)?;
    Ok(())
}

/// `user ++ project`, both big endian.
pub(crate) fn pending_key(user: UserId, project: ProjectId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&user.to_be_bytes());
    key[8..].copy_from_slice(&project.to_be_bytes());
    key
}

/// `project ++ seq`, so a prefix scan yields a project's pledges in
/// acceptance order.
pub(crate) fn pledge_key(project: ProjectId, seq: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&project.to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}
