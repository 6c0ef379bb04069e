//! The pledger's first transaction: locks the pledged amount in a contract output.

use bitcoin::{
    absolute, sighash::EcdsaSighashType, transaction::Version, Amount, PrivateKey, ScriptBuf,
    Transaction, TxOut,
};
use satfund_contract::ContractScript;
use satfund_primitives::utxo::UnspentOutput;
use tracing::*;

use crate::{
    error::TxError,
    refund::{craft_refund, RefundParams},
    signing::{p2pkh_script_sig, public_key, sign_legacy_input},
    verify::{check_value_balance, sum_values, verify_scripts},
};

/// Inputs to [`craft_locked_output`].
#[derive(Debug, Clone)]
pub struct LockedOutputParams<'a> {
    /// Pay-to-pubkey-hash outputs to spend, usually from
    /// [`choose_inputs`](crate::select::choose_inputs).
    pub inputs: &'a [UnspentOutput],
    /// One key per input, same order.
    pub signing_keys: &'a [PrivateKey],
    pub amount: Amount,
    pub min_fee: Amount,
    pub contract: ContractScript,
    pub change_script: ScriptBuf,
    pub refund: RefundParams,
}

/// A signed locked-output transaction and the refund spending it.
#[derive(Debug, Clone)]
pub struct LockedOutput {
    pub transaction: Transaction,
    pub contract: ContractScript,
    pub refund_transaction: Transaction,
}

/// Builds and signs the transaction whose output 0 locks `amount` in the
/// contract, with any change in output 1, then derives its refund.
pub fn craft_locked_output(params: &LockedOutputParams<'_>) -> Result<LockedOutput, TxError> {
    let LockedOutputParams {
        inputs,
        signing_keys,
        amount,
        min_fee,
        contract,
        change_script,
        refund,
    } = params;

    if inputs.len() != signing_keys.len() {
        return Err(TxError::KeyCountMismatch {
            expected: inputs.len(),
            got: signing_keys.len(),
        });
    }

    let total = sum_values(inputs.iter().map(|u| u.value))?;
    let change = amount
        .checked_add(*min_fee)
        .and_then(|needed| total.checked_sub(needed))
        .ok_or(TxError::InsufficientInputValue {
            inputs: total,
            outputs: *amount,
            fee: *min_fee,
        })?;

    let mut output = vec![TxOut {
        value: *amount,
        script_pubkey: contract.to_locking_form(),
    }];
    if change > Amount::ZERO {
        output.push(TxOut {
            value: change,
            script_pubkey: change_script.clone(),
        });
    }

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: inputs.iter().map(UnspentOutput::to_unsigned_txin).collect(),
        output,
    };

    // Sign against the unsigned transaction; legacy sighashes blank every
    // other scriptSig anyway.
    let unsigned = tx.clone();
    for (idx, (utxo, key)) in inputs.iter().zip(signing_keys.iter()).enumerate() {
        let sig = sign_legacy_input(
            &unsigned,
            idx,
            &utxo.locking_script,
            EcdsaSighashType::All,
            key,
        )?;
        tx.input[idx].script_sig = p2pkh_script_sig(&sig, &public_key(key))?;
    }

    let prevouts: Vec<TxOut> = inputs.iter().map(UnspentOutput::to_txout).collect();
    verify_scripts(&tx, &prevouts)?;
    check_value_balance(&tx, &prevouts)?;

    let refund_transaction = craft_refund(&tx, contract, refund)?;

    debug!(
        txid = %tx.compute_txid(),
        %amount,
        %change,
        inputs = inputs.len(),
        "crafted locked output"
    );

    Ok(LockedOutput {
        transaction: tx,
        contract: *contract,
        refund_transaction,
    })
}
