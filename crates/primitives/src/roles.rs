use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::ParseError;

/// Which branch of an account a derived key belongs to.
///
/// `External` keys receive funds (pledge contracts, project payouts, refunds),
/// `Change` keys collect the remainder of a spent set of outputs.
#[repr(u32)]
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    BorshDeserialize,
    BorshSerialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[borsh(use_discriminant = false)]
pub enum DerivationRole {
    External = 0,
    Change = 1,
}

impl DerivationRole {
    /// The unhardened child number used for this role in a derivation path.
    pub fn child_index(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for DerivationRole {
    type Error = ParseError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::External),
            1 => Ok(Self::Change),
            other => Err(ParseError::UnknownRole(other)),
        }
    }
}

impl fmt::Display for DerivationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External => f.write_str("external"),
            Self::Change => f.write_str("change"),
        }
    }
}
