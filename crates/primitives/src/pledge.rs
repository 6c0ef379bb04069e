use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Txid, Witness};
use serde::{Deserialize, Serialize};

/// A signed input spending a pledger's contract output, ready to be merged into
/// the project's funding transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PledgeInput {
    pub prev_txid: Txid,
    pub output_index: u32,
    pub sequence: Sequence,
    pub script_sig: ScriptBuf,
    /// The contract output being spent.
    pub output: TxOut,
}

impl PledgeInput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.prev_txid, self.output_index)
    }

    pub fn value(&self) -> Amount {
        self.output.value
    }

    pub fn to_txin(&self) -> TxIn {
        TxIn {
            previous_output: self.outpoint(),
            script_sig: self.script_sig.clone(),
            sequence: self.sequence,
            witness: Witness::new(),
        }
    }

    /// Rebuilds the pledge from an input and the output it spends.
    pub fn from_txin(txin: &TxIn, output: TxOut) -> Self {
        Self {
            prev_txid: txin.previous_output.txid,
            output_index: txin.previous_output.vout,
            sequence: txin.sequence,
            script_sig: txin.script_sig.clone(),
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;

    use super::*;

    #[test]
    fn test_txin_roundtrip() {
        let pledge = PledgeInput {
            prev_txid: Txid::from_byte_array([3; 32]),
            output_index: 1,
            sequence: Sequence::MAX,
            script_sig: ScriptBuf::from_bytes(vec![0x51]),
            output: TxOut {
                value: Amount::from_sat(5_000),
                script_pubkey: ScriptBuf::new(),
            },
        };
        let txin = pledge.to_txin();
        assert_eq!(txin.previous_output, pledge.outpoint());
        assert_eq!(PledgeInput::from_txin(&txin, pledge.output.clone()), pledge);
    }
}
