//! Server-side checks of what pledgers hand over.
//!
//! The server holds no private keys. It rebuilds the contract a pledger was
//! told to lock into from the account xpub and checks the submitted
//! transactions against it, delegating signature checks to consensus
//! verification.

use bitcoin::{
    absolute, bip32::Xpub, sighash::EcdsaSighashType, transaction::Version, Amount, OutPoint,
    PubkeyHash, Transaction, TxIn, TxOut,
};
use satfund_contract::{ContractScript, ContractSpend, ParsedSpend};
use satfund_db_types::types::ProjectEntry;
use satfund_key_derivation::{derive_public, paths::role_path, pubkey_hash};
use satfund_primitives::{pledge::PledgeInput, roles::DerivationRole};
use satfund_tx::{check_value_balance, pledge_input_from_partial, verify_scripts};

use crate::{
    errors::{PledgeError, PledgeResult},
    params::PledgeParams,
};

/// Hash of the external key at `index`. Pledge contracts and project payouts
/// commit to it.
pub fn external_key_hash(xpub: &Xpub, index: u32) -> PledgeResult<PubkeyHash> {
    let child = derive_public(xpub, &role_path(DerivationRole::External, index)?)?;
    Ok(pubkey_hash(&child))
}

/// The contract a pledge to `project` must lock into, for the external key at
/// `external_index`.
pub fn expected_contract(
    xpub: &Xpub,
    external_index: u32,
    project: &ProjectEntry,
    params: &PledgeParams,
) -> PledgeResult<ContractScript> {
    Ok(ContractScript::new(
        project.secret.hash(),
        external_key_hash(xpub, external_index)?,
        params.contract_lock_time(project.deadline)?,
    )?)
}

/// Checks that output 0 of the locking transaction pays a positive amount to
/// `contract`. Returns the locked amount.
pub fn validate_locked_tx(tx: &Transaction, contract: &ContractScript) -> PledgeResult<Amount> {
    if tx.input.is_empty() {
        return Err(PledgeError::malformed("locking transaction has no inputs"));
    }
    let Some(locked) = tx.output.first() else {
        return Err(PledgeError::malformed("locking transaction has no outputs"));
    };
    if !contract.is_locked_by(&locked.script_pubkey) {
        return Err(PledgeError::malformed(
            "output 0 does not pay to the expected contract",
        ));
    }
    if locked.value == Amount::ZERO {
        return Err(PledgeError::malformed("locked amount is zero"));
    }
    Ok(locked.value)
}

/// Checks that `refund` spends output 0 of `locked_tx` through the time-lock
/// branch, no earlier than `min_lock_time`, and carries a valid signature.
pub fn validate_refund_tx(
    refund: &Transaction,
    locked_tx: &Transaction,
    min_lock_time: absolute::LockTime,
) -> PledgeResult<()> {
    let locked = locked_output(locked_tx)?;
    let [txin] = refund.input.as_slice() else {
        return Err(PledgeError::malformed(format!(
            "refund must have exactly one input, has {}",
            refund.input.len()
        )));
    };
    if txin.previous_output != OutPoint::new(locked_tx.compute_txid(), 0) {
        return Err(PledgeError::malformed(
            "refund does not spend the locked output",
        ));
    }
    if !refund.lock_time.is_block_time()
        || refund.lock_time.to_consensus_u32() < min_lock_time.to_consensus_u32()
    {
        return Err(PledgeError::malformed(format!(
            "refund lock time {} is before {min_lock_time}",
            refund.lock_time
        )));
    }
    if !txin.sequence.enables_absolute_lock_time() {
        return Err(PledgeError::malformed(
            "refund input sequence disables its lock time",
        ));
    }

    let prevouts = [locked];
    verify_scripts(refund, &prevouts)?;
    check_value_balance(refund, &prevouts)?;
    Ok(())
}

/// Assembles the single-input partial the pledger signed and verifies it.
///
/// The signature commits to the sole output, so the partial only verifies if
/// the pledger signed over `fund_goal` paid to the project. It must also be
/// `ALL|ANYONECANPAY` through the hash branch, or it would stop verifying
/// once other pledgers' inputs are appended.
pub fn validate_partial(
    txin: TxIn,
    locked_tx: &Transaction,
    project: &ProjectEntry,
) -> PledgeResult<PledgeInput> {
    let locked = locked_output(locked_tx)?;
    if txin.previous_output != OutPoint::new(locked_tx.compute_txid(), 0) {
        return Err(PledgeError::malformed(
            "input does not spend the locked output",
        ));
    }
    check_partial_unlock(&txin)?;

    let partial = Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![txin],
        output: vec![TxOut {
            value: project.fund_goal(),
            script_pubkey: project.payout_script(),
        }],
    };
    verify_scripts(&partial, &[locked.clone()])?;
    Ok(pledge_input_from_partial(&partial, locked)?)
}

fn check_partial_unlock(txin: &TxIn) -> PledgeResult<()> {
    let unlock = ParsedSpend::parse(&txin.script_sig)
        .map_err(|e| PledgeError::malformed(format!("partial unlocking script: {e}")))?;
    if !matches!(unlock.spend, ContractSpend::Claim { .. }) {
        return Err(PledgeError::malformed(
            "partial must spend through the hash branch",
        ));
    }
    let sighash_type = unlock.signature.sighash_type;
    if sighash_type != EcdsaSighashType::AllPlusAnyoneCanPay {
        return Err(PledgeError::malformed(format!(
            "partial signed {sighash_type}, expected {}",
            EcdsaSighashType::AllPlusAnyoneCanPay
        )));
    }
    Ok(())
}

fn locked_output(locked_tx: &Transaction) -> PledgeResult<TxOut> {
    locked_tx
        .output
        .first()
        .cloned()
        .ok_or_else(|| PledgeError::malformed("locking transaction has no outputs"))
}
