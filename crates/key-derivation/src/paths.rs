//! Derivation path layout: `m/44'/<coin>'/0'/<role>/<index>`.

use bitcoin::{
    bip32::{ChildNumber, DerivationPath},
    Network,
};
use satfund_primitives::roles::DerivationRole;

use crate::error::KeyError;

/// BIP-44 purpose.
pub const PURPOSE_IDX: u32 = 44;

/// Only the first account of a seed is used.
pub const ACCOUNT_IDX: u32 = 0;

/// SLIP-44 coin type: 0 on mainnet, 1 on every test network.
pub fn coin_type(network: Network) -> u32 {
    match network {
        Network::Bitcoin => 0,
        _ => 1,
    }
}

/// Hardened path from the master key to the account key.
pub fn account_path(network: Network) -> Result<DerivationPath, KeyError> {
    Ok(DerivationPath::from(vec![
        ChildNumber::from_hardened_idx(PURPOSE_IDX)?,
        ChildNumber::from_hardened_idx(coin_type(network))?,
        ChildNumber::from_hardened_idx(ACCOUNT_IDX)?,
    ]))
}

/// Unhardened path from the account key, `m/<role>/<index>`.
pub fn role_path(role: DerivationRole, index: u32) -> Result<DerivationPath, KeyError> {
    Ok(DerivationPath::from(vec![
        ChildNumber::from_normal_idx(role.child_index())?,
        ChildNumber::from_normal_idx(index)?,
    ]))
}

/// Path from the master key all the way down to a leaf.
pub fn full_path(
    network: Network,
    role: DerivationRole,
    index: u32,
) -> Result<DerivationPath, KeyError> {
    Ok(account_path(network)?.extend(role_path(role, index)?))
}

/// Splits an account-relative path back into its role and index.
pub fn parse_role_path(path: &DerivationPath) -> Result<(DerivationRole, u32), KeyError> {
    match path.as_ref() {
        [ChildNumber::Normal { index: role }, ChildNumber::Normal { index }] => {
            let role =
                DerivationRole::try_from(*role).map_err(|_| KeyError::UnexpectedPath(path.clone()))?;
            Ok((role, *index))
        }
        _ => Err(KeyError::UnexpectedPath(path.clone())),
    }
}
