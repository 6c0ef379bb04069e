use std::io;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("entry does not exist")]
    NonExistentEntry,

    #[error("entry already exists")]
    EntryAlreadyExists,

    /// A compare-and-swap precondition did not hold; nothing was written.
    #[error("update conflict on {0}")]
    UpdateConflict(String),

    #[error("derivation index exhausted")]
    IndexExhausted,

    #[error("IO Error: {0}")]
    IoError(String),

    #[error("codec error {0}")]
    CodecError(String),

    #[error("transaction error {0}")]
    TransactionError(String),

    #[error("{0}")]
    Other(String),
}

impl DbError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::UpdateConflict(_))
    }
}

impl From<io::Error> for DbError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value.to_string())
    }
}
