use bitcoin::Amount;
use satfund_btcio::ClientError;
use satfund_contract::ContractError;
use satfund_db_types::DbError;
use satfund_key_derivation::KeyError;
use satfund_primitives::{
    errors::LockTimeError,
    ids::{ProjectId, UserId},
};
use satfund_tx::{SelectionError, TxError};
use thiserror::Error;

/// Failures of project and pledge operations.
#[derive(Debug, Error)]
pub enum PledgeError {
    #[error("invalid derivation: {0}")]
    InvalidDerivation(#[from] KeyError),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    /// Construction or verification of a transaction failed.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] TxError),

    /// A client submission failed structural validation.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A concurrent update won; the whole atomic unit was rolled back.
    #[error("update conflict: {0}")]
    UpdateConflict(String),

    /// The broadcast service rejected the transaction or could not be reached.
    #[error("broadcast failed (status {status:?}): {message}")]
    BroadcastFailure { status: Option<u16>, message: String },

    #[error("chain query failed: {0}")]
    ChainQuery(ClientError),

    #[error("unknown {0}")]
    UnknownUser(UserId),

    #[error("unknown {0}")]
    UnknownProject(ProjectId),

    #[error("{0} no longer accepts pledges")]
    ProjectClosed(ProjectId),

    #[error("stage {got} is not valid here, expected {expected}")]
    OutOfOrder {
        expected: &'static str,
        got: &'static str,
    },

    #[error("contract: {0}")]
    Contract(#[from] ContractError),

    #[error("database: {0}")]
    Db(DbError),
}

impl PledgeError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// Errors caused by what the client sent, as opposed to server-side failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDerivation(_)
                | Self::InsufficientFunds { .. }
                | Self::InvalidTransaction(_)
                | Self::MalformedInput(_)
                | Self::UnknownUser(_)
                | Self::UnknownProject(_)
                | Self::ProjectClosed(_)
                | Self::OutOfOrder { .. }
        )
    }

    /// Stable name of the error's class, for clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDerivation(_) => "InvalidDerivation",
            Self::InsufficientFunds { .. } => "InsufficientFunds",
            Self::InvalidTransaction(_) | Self::Contract(_) => "InvalidTransaction",
            Self::MalformedInput(_) => "MalformedInput",
            Self::UpdateConflict(_) => "UpdateConflict",
            Self::BroadcastFailure { .. } => "BroadcastFailure",
            Self::ChainQuery(_) => "ChainQuery",
            Self::UnknownUser(_) | Self::UnknownProject(_) => "NotFound",
            Self::ProjectClosed(_) => "ProjectClosed",
            Self::OutOfOrder { .. } => "OutOfOrder",
            Self::Db(_) => "Database",
        }
    }
}

impl From<DbError> for PledgeError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::UpdateConflict(msg) => Self::UpdateConflict(msg),
            other => Self::Db(other),
        }
    }
}

impl From<SelectionError> for PledgeError {
    fn from(value: SelectionError) -> Self {
        match value {
            SelectionError::InsufficientFunds { needed, available } => {
                Self::InsufficientFunds { needed, available }
            }
            other => Self::InvalidTransaction(other.into()),
        }
    }
}

impl From<LockTimeError> for PledgeError {
    fn from(value: LockTimeError) -> Self {
        Self::malformed(value.to_string())
    }
}

pub type PledgeResult<T> = Result<T, PledgeError>;
