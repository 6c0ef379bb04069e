//! Self-verification of constructed transactions.

use bitcoin::{
    consensus::{serialize, verify_script},
    Amount, Transaction, TxOut,
};
use tracing::*;

use crate::error::TxError;

/// Runs every input's scripts through libbitcoinconsensus.
///
/// `prevouts` lists the outputs being spent, in input order. Values are not
/// checked here, see [`check_value_balance`].
pub fn verify_scripts(tx: &Transaction, prevouts: &[TxOut]) -> Result<(), TxError> {
    if prevouts.len() != tx.input.len() {
        return Err(TxError::Verification(format!(
            "expected {} spent outputs, got {}",
            tx.input.len(),
            prevouts.len()
        )));
    }

    let serialized = serialize(tx);
    for (idx, (txin, prevout)) in tx.input.iter().zip(prevouts).enumerate() {
        verify_script(&prevout.script_pubkey, idx, prevout.value, &serialized).map_err(|e| {
            debug!(txid = %tx.compute_txid(), %idx, ?e, "input failed verification");
            TxError::Verification(format!(
                "input {idx} spending {} rejected by script validation: {e:?}",
                txin.previous_output
            ))
        })?;
    }
    Ok(())
}

/// Checks that the spent outputs cover the transaction's outputs and returns
/// the implied fee.
pub fn check_value_balance(tx: &Transaction, prevouts: &[TxOut]) -> Result<Amount, TxError> {
    let inputs = sum_values(prevouts.iter().map(|o| o.value))?;
    let outputs = sum_values(tx.output.iter().map(|o| o.value))?;
    inputs
        .checked_sub(outputs)
        .ok_or(TxError::InsufficientInputValue {
            inputs,
            outputs,
            fee: Amount::ZERO,
        })
}

pub(crate) fn sum_values(values: impl IntoIterator<Item = Amount>) -> Result<Amount, TxError> {
    values
        .into_iter()
        .try_fold(Amount::ZERO, |acc, v| acc.checked_add(v))
        .ok_or(TxError::AmountOverflow)
}
