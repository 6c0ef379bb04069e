use bitcoin::bip32::{self, DerivationPath};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    /// Path cannot be derived from the given key: hardened step from a public
    /// key, or a child index outside the allowed range.
    #[error("invalid derivation: {0}")]
    InvalidDerivation(#[from] bip32::Error),

    /// The path is not of the account-relative `m/<role>/<index>` form.
    #[error("unexpected account path {0}")]
    UnexpectedPath(DerivationPath),

    #[error("invalid seed phrase: {0}")]
    InvalidMnemonic(#[from] bip39::Error),
}
