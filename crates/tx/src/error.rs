use bitcoin::{absolute, transaction::InputsIndexError, Amount, OutPoint};
use satfund_contract::ContractError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("amount overflow")]
    AmountOverflow,
}

#[derive(Debug, Error)]
pub enum TxError {
    /// The assembled transaction was rejected by libbitcoinconsensus.
    #[error("transaction failed verification: {0}")]
    Verification(String),

    #[error("inputs worth {inputs} cannot pay {outputs} plus fee {fee}")]
    InsufficientInputValue {
        inputs: Amount,
        outputs: Amount,
        fee: Amount,
    },

    #[error("expected {expected} signing keys, got {got}")]
    KeyCountMismatch { expected: usize, got: usize },

    #[error("refund lock time {refund} must be a timestamp after the contract lock time {contract}")]
    RefundLockTimeTooEarly {
        refund: absolute::LockTime,
        contract: absolute::LockTime,
    },

    #[error("transaction has no output paying to the contract")]
    MissingContractOutput,

    #[error("secret does not match the contract's secret hash")]
    SecretMismatch,

    #[error("outpoint {0} spent more than once")]
    DuplicateInput(OutPoint),

    #[error("expected a single-input partial, got {0} inputs")]
    NotPartial(usize),

    #[error("amount overflow")]
    AmountOverflow,

    #[error("sighash: {0}")]
    Sighash(#[from] InputsIndexError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

impl TxError {
    /// Whether the error comes from consensus script validation.
    pub fn is_verification(&self) -> bool {
        matches!(self, Self::Verification(_))
    }
}
