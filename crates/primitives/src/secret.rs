//! Per-project secret token whose hash is committed in every pledge contract.

use std::fmt;

use bitcoin::hashes::{hash160, Hash};
use borsh::{BorshDeserialize, BorshSerialize};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ParseError;

pub const SECRET_TOKEN_LEN: usize = 32;

/// Random preimage revealed to pledgers once their funds are locked.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SecretToken([u8; SECRET_TOKEN_LEN]);

impl SecretToken {
    pub fn new(bytes: [u8; SECRET_TOKEN_LEN]) -> Self {
        Self(bytes)
    }

    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SECRET_TOKEN_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_TOKEN_LEN] {
        &self.0
    }

    /// `HASH160(secret)`, the value pushed into the contract script.
    pub fn hash(&self) -> hash160::Hash {
        hash160::Hash::hash(&self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, ParseError> {
        let raw = hex::decode(s).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
        let bytes: [u8; SECRET_TOKEN_LEN] =
            raw.as_slice()
                .try_into()
                .map_err(|_| ParseError::InvalidLength {
                    expected: SECRET_TOKEN_LEN,
                    actual: raw.len(),
                })?;
        Ok(Self(bytes))
    }
}

// Only the hash is safe to print.
impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretToken(hash={})", self.hash())
    }
}

impl Serialize for SecretToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SecretToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;

    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let secret = SecretToken::generate(&mut thread_rng());
        let parsed = SecretToken::from_hex(&secret.to_hex()).unwrap();
        assert_eq!(parsed, secret);
        assert_eq!(parsed.hash(), secret.hash());
    }

    #[test]
    fn test_rejects_short_hex() {
        let err = SecretToken::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn test_json_is_hex_string() {
        let secret = SecretToken::new([7u8; 32]);
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(32)));
        let back: SecretToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, secret);
        assert!(serde_json::from_str::<SecretToken>("\"abcd\"").is_err());
    }

    #[test]
    fn test_debug_hides_preimage() {
        let secret = SecretToken::new([0xab; 32]);
        assert!(!format!("{secret:?}").contains(&secret.to_hex()));
    }
}
