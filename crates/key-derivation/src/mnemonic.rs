//! BIP-39 seed phrases.

use bip39::{Language, Mnemonic};
use bitcoin::{
    bip32::{Xpriv, Xpub},
    Network,
};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::{error::KeyError, pledger::PledgerKeys, zeroizable::ZeroizableXpriv};

/// 256 bits of entropy, a 24 word phrase.
const SEED_ENTROPY_LEN: usize = 32;

/// Generates a fresh 24 word English seed phrase.
pub fn generate_seed_phrase<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Mnemonic, KeyError> {
    let mut entropy = [0u8; SEED_ENTROPY_LEN];
    rng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy(&entropy);
    entropy.zeroize();
    Ok(mnemonic?)
}

/// Parses an English seed phrase, tolerating surrounding whitespace.
pub fn parse_seed_phrase(phrase: &str) -> Result<Mnemonic, KeyError> {
    Ok(Mnemonic::parse_in_normalized(Language::English, phrase.trim())?)
}

pub fn validate_seed_phrase(phrase: &str) -> bool {
    parse_seed_phrase(phrase).is_ok()
}

/// Master key of a seed phrase.
pub fn master_xpriv(
    mnemonic: &Mnemonic,
    passphrase: &str,
    network: Network,
) -> Result<ZeroizableXpriv, KeyError> {
    let mut seed = mnemonic.to_seed(passphrase);
    let master = Xpriv::new_master(network, &seed);
    seed.zeroize();
    Ok(ZeroizableXpriv::new(master?))
}

/// Account-level extended public key, the only key material the server stores
/// for a user.
pub fn account_xpub(
    mnemonic: &Mnemonic,
    passphrase: &str,
    network: Network,
) -> Result<Xpub, KeyError> {
    Ok(PledgerKeys::from_mnemonic(mnemonic, passphrase, network)?.account_xpub())
}
