use bitcoin::{bip32::DerivationPath, Amount, OutPoint, ScriptBuf, TxIn, TxOut, Txid};
use serde::{Deserialize, Serialize};

/// An unspent output owned by an account, as reported by the chain query service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub txid: Txid,
    pub output_index: u32,
    pub locking_script: ScriptBuf,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
    /// Path relative to the account key, `m/<role>/<index>`.
    pub derivation_path: DerivationPath,
}

impl UnspentOutput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.output_index)
    }

    pub fn to_txout(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.locking_script.clone(),
        }
    }

    /// Unsigned input spending this output.
    pub fn to_unsigned_txin(&self) -> TxIn {
        TxIn {
            previous_output: self.outpoint(),
            ..Default::default()
        }
    }
}
