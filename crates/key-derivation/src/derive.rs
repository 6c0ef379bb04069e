//! Pure derivation helpers over extended keys.

use bitcoin::{
    bip32::{DerivationPath, Xpriv, Xpub},
    Address, Network, PubkeyHash,
};
use secp256k1::SECP256K1;

use crate::error::KeyError;

/// Derives a private child key along `path`.
pub fn derive_private(root: &Xpriv, path: &DerivationPath) -> Result<Xpriv, KeyError> {
    Ok(root.derive_priv(SECP256K1, path)?)
}

/// Derives a public child key along `path`.
///
/// Fails with [`KeyError::InvalidDerivation`] if the path contains a hardened
/// step, since those need the private key.
pub fn derive_public(root: &Xpub, path: &DerivationPath) -> Result<Xpub, KeyError> {
    Ok(root.derive_pub(SECP256K1, path)?)
}

/// `HASH160` of the compressed public key.
pub fn pubkey_hash(key: &Xpub) -> PubkeyHash {
    key.to_pub().pubkey_hash()
}

/// Pay-to-pubkey-hash address of a derived key.
pub fn address_from_key(key: &Xpub, network: Network) -> Address {
    Address::p2pkh(pubkey_hash(key), network)
}
