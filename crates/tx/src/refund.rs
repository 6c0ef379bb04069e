//! Refund of a locked output through the contract's time-lock branch.

use bitcoin::{
    absolute, sighash::EcdsaSighashType, transaction::Version, Amount, OutPoint, PrivateKey,
    ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use satfund_contract::{ContractScript, ContractSpend};

use crate::{
    error::TxError,
    signing::{public_key, sign_legacy_input},
    verify::{check_value_balance, verify_scripts},
};

#[derive(Debug, Clone)]
pub struct RefundParams {
    /// Where the refunded value goes, normally the pledger's contract address.
    pub refund_script: ScriptBuf,
    /// Key whose hash is committed in the contract.
    pub signing_key: PrivateKey,
    /// Transaction lock time, strictly after the contract's.
    pub lock_time: absolute::LockTime,
    pub min_fee: Amount,
}

/// Finds the output of `tx` paying to `contract`.
pub(crate) fn contract_output(
    tx: &Transaction,
    contract: &ContractScript,
) -> Result<(OutPoint, TxOut), TxError> {
    let vout = tx
        .output
        .iter()
        .position(|o| contract.is_locked_by(&o.script_pubkey))
        .ok_or(TxError::MissingContractOutput)?;
    Ok((
        OutPoint::new(tx.compute_txid(), vout as u32),
        tx.output[vout].clone(),
    ))
}

/// Spends the contract output of `locked_tx` back to the pledger, valid only
/// once the refund lock time has passed.
pub fn craft_refund(
    locked_tx: &Transaction,
    contract: &ContractScript,
    params: &RefundParams,
) -> Result<Transaction, TxError> {
    let contract_lock = contract.lock_time();
    if !params.lock_time.is_block_time()
        || params.lock_time.to_consensus_u32() <= contract_lock.to_consensus_u32()
    {
        return Err(TxError::RefundLockTimeTooEarly {
            refund: params.lock_time,
            contract: contract_lock,
        });
    }

    let (outpoint, locked) = contract_output(locked_tx, contract)?;
    let value = locked
        .value
        .checked_sub(params.min_fee)
        .filter(|v| *v > Amount::ZERO)
        .ok_or(TxError::InsufficientInputValue {
            inputs: locked.value,
            outputs: Amount::ZERO,
            fee: params.min_fee,
        })?;

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: params.lock_time,
        input: vec![TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::new(),
            // Must not be final or the lock time is ignored.
            sequence: Sequence::ENABLE_LOCKTIME_NO_RBF,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value,
            script_pubkey: params.refund_script.clone(),
        }],
    };

    let sig = sign_legacy_input(
        &tx,
        0,
        &contract.redeem_script(),
        EcdsaSighashType::All,
        &params.signing_key,
    )?;
    tx.input[0].script_sig =
        ContractSpend::Refund.script_sig(contract, &sig, &public_key(&params.signing_key))?;

    let prevouts = [locked];
    verify_scripts(&tx, &prevouts)?;
    check_value_balance(&tx, &prevouts)?;
    Ok(tx)
}
