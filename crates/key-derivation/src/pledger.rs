//! Client-side signing keys.

use bip39::Mnemonic;
use bitcoin::{
    bip32::{DerivationPath, Xpriv, Xpub},
    Address, Network, PrivateKey,
};
use satfund_primitives::{roles::DerivationRole, utxo::UnspentOutput};
use secp256k1::SECP256K1;

use crate::{
    derive::{address_from_key, derive_private},
    error::KeyError,
    mnemonic::master_xpriv,
    paths::{account_path, parse_role_path, role_path},
    zeroizable::ZeroizableXpriv,
};

/// Holds a user's account key and derives the leaf keys that sign their pledges.
///
/// Never leaves the pledger's side; the server only receives
/// [`account_xpub`](Self::account_xpub).
#[derive(Debug, Clone)]
pub struct PledgerKeys {
    account: ZeroizableXpriv,
    network: Network,
}

impl PledgerKeys {
    /// Derives the account key `m/44'/<coin>'/0'` from a master key.
    pub fn new(master: &Xpriv, network: Network) -> Result<Self, KeyError> {
        let account = derive_private(master, &account_path(network)?)?;
        Ok(Self {
            account: ZeroizableXpriv::new(account),
            network,
        })
    }

    pub fn from_mnemonic(
        mnemonic: &Mnemonic,
        passphrase: &str,
        network: Network,
    ) -> Result<Self, KeyError> {
        let master = master_xpriv(mnemonic, passphrase, network)?;
        Self::new(&master, network)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn account_xpub(&self) -> Xpub {
        Xpub::from_priv(SECP256K1, &self.account)
    }

    /// Signing key for an account-relative path of the `m/<role>/<index>` form.
    pub fn signing_key_at(&self, path: &DerivationPath) -> Result<PrivateKey, KeyError> {
        parse_role_path(path)?;
        Ok(derive_private(&self.account, path)?.to_priv())
    }

    pub fn signing_key(&self, role: DerivationRole, index: u32) -> Result<PrivateKey, KeyError> {
        self.signing_key_at(&role_path(role, index)?)
    }

    /// Keys for each output, in the same order.
    pub fn signing_keys_for(&self, utxos: &[UnspentOutput]) -> Result<Vec<PrivateKey>, KeyError> {
        utxos
            .iter()
            .map(|utxo| self.signing_key_at(&utxo.derivation_path))
            .collect()
    }

    pub fn address(&self, role: DerivationRole, index: u32) -> Result<Address, KeyError> {
        let child = derive_private(&self.account, &role_path(role, index)?)?;
        Ok(address_from_key(
            &Xpub::from_priv(SECP256K1, &child),
            self.network,
        ))
    }
}
