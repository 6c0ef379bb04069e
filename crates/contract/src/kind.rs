use bitcoin::{Script, ScriptBuf};

use crate::script::ContractScript;

/// How a transaction input is unlocked, which also determines the script code
/// committed to by its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// Plain pay-to-pubkey-hash output; the script code is the prevout script.
    Standard { script_pubkey: ScriptBuf },

    /// Pledge contract behind a script hash; the script code is the redeem script.
    ScriptHash { contract: ContractScript },
}

impl InputKind {
    pub fn script_code(&self) -> ScriptBuf {
        match self {
            Self::Standard { script_pubkey } => script_pubkey.clone(),
            Self::ScriptHash { contract } => contract.redeem_script(),
        }
    }

    /// The `script_pubkey` of the output being spent.
    pub fn locking_script(&self) -> ScriptBuf {
        match self {
            Self::Standard { script_pubkey } => script_pubkey.clone(),
            Self::ScriptHash { contract } => contract.to_locking_form(),
        }
    }

    pub fn standard(script_pubkey: &Script) -> Self {
        Self::Standard {
            script_pubkey: script_pubkey.to_owned(),
        }
    }
}
