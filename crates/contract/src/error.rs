use bitcoin::{absolute, ecdsa, key, script::PushBytesError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("lock time {0} is a block height, expected a timestamp")]
    NotTimeBased(absolute::LockTime),

    #[error("script does not match the contract template")]
    Malformed,

    #[error("malformed unlocking script: {0}")]
    MalformedUnlock(&'static str),

    #[error("push too large: {0}")]
    Push(#[from] PushBytesError),

    #[error("invalid signature encoding: {0}")]
    Signature(#[from] ecdsa::Error),

    #[error("invalid public key: {0}")]
    PublicKey(#[from] key::FromSliceError),
}
