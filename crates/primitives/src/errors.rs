//! Errors during parsing/conversion of primitives.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown derivation role {0}")]
    UnknownRole(u32),
}

/// Errors converting calendar times into transaction lock times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockTimeError {
    /// Values below the threshold are interpreted by consensus as block heights.
    #[error("timestamp {0} is below the lock time threshold")]
    BelowThreshold(u64),

    #[error("timestamp {0} does not fit a 32-bit lock time")]
    Overflow(u64),
}
