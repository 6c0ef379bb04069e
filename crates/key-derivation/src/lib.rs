//! BIP-32/BIP-39 key handling for pledgers, project creators and the server.
//!
//! The server only ever sees account-level [`Xpub`](bitcoin::bip32::Xpub)s and
//! derives public children from them; signing keys are derived client-side by
//! [`PledgerKeys`](pledger::PledgerKeys).

pub mod derive;
pub mod error;
pub mod mnemonic;
pub mod paths;
pub mod pledger;
pub mod zeroizable;

pub use derive::{address_from_key, derive_private, derive_public, pubkey_hash};
pub use error::KeyError;
pub use mnemonic::{account_xpub, generate_seed_phrase, parse_seed_phrase, validate_seed_phrase};
pub use pledger::PledgerKeys;
pub use zeroizable::ZeroizableXpriv;
