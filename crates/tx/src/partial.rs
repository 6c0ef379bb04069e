//! The pledger's contribution to the funding transaction.

use bitcoin::{
    absolute, sighash::EcdsaSighashType, transaction::Version, Amount, PrivateKey, Script,
    ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use satfund_contract::{ContractScript, ContractSpend};
use satfund_primitives::{pledge::PledgeInput, secret::SecretToken};

use crate::{
    error::TxError,
    refund::contract_output,
    signing::{public_key, sign_legacy_input},
    verify::verify_scripts,
};

/// Builds a one-input transaction spending the whole contract output of
/// `locked_tx` to the project, signed `ALL|ANYONECANPAY` through the hash
/// branch.
///
/// The single output pays the full `fund_goal`, which the input alone does
/// not cover. The signature only commits to its own input and to that
/// output, so it stays valid when other pledgers' inputs are appended.
pub fn craft_partial(
    locked_tx: &Transaction,
    project_script: &Script,
    fund_goal: Amount,
    signing_key: &PrivateKey,
    contract: &ContractScript,
    secret: &SecretToken,
) -> Result<Transaction, TxError> {
    if secret.hash() != contract.secret_hash() {
        return Err(TxError::SecretMismatch);
    }

    let (outpoint, locked) = contract_output(locked_tx, contract)?;

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: fund_goal,
            script_pubkey: project_script.to_owned(),
        }],
    };

    let sig = sign_legacy_input(
        &tx,
        0,
        &contract.redeem_script(),
        EcdsaSighashType::AllPlusAnyoneCanPay,
        signing_key,
    )?;
    let spend = ContractSpend::Claim {
        secret: secret.clone(),
    };
    tx.input[0].script_sig = spend.script_sig(contract, &sig, &public_key(signing_key))?;

    verify_scripts(&tx, &[locked])?;
    Ok(tx)
}

/// Extracts the signed input of a partial along with the output it spends.
pub fn pledge_input_from_partial(
    partial: &Transaction,
    locked_output: TxOut,
) -> Result<PledgeInput, TxError> {
    match partial.input.as_slice() {
        [txin] => Ok(PledgeInput::from_txin(txin, locked_output)),
        other => Err(TxError::NotPartial(other.len())),
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{hashes::Hash, OutPoint, Txid};

    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_partial_layout_and_validity() {
        let (keys, locked) = locked_pledge(20, 100_000, 60_000);
        let goal = Amount::from_sat(150_000);
        let partial = craft_partial(
            &locked.transaction,
            &project_script(),
            goal,
            &contract_key(&keys),
            &locked.contract,
            &secret(),
        )
        .unwrap();

        assert_eq!(partial.input.len(), 1);
        assert_eq!(partial.output, vec![TxOut {
            value: goal,
            script_pubkey: project_script(),
        }]);
        assert_eq!(
            partial.input[0].previous_output,
            OutPoint::new(locked.transaction.compute_txid(), 0)
        );

        let pledge =
            pledge_input_from_partial(&partial, locked.transaction.output[0].clone()).unwrap();
        assert_eq!(pledge.value(), Amount::from_sat(60_000));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (keys, locked) = locked_pledge(21, 100_000, 60_000);
        let res = craft_partial(
            &locked.transaction,
            &project_script(),
            Amount::from_sat(60_000),
            &contract_key(&keys),
            &locked.contract,
            &SecretToken::new([0; 32]),
        );
        assert!(matches!(res, Err(TxError::SecretMismatch)));
    }

    #[test]
    fn test_wrong_secret_in_script_fails_before_lock_time() {
        let (keys, locked) = locked_pledge(22, 100_000, 60_000);
        let mut tx = craft_partial(
            &locked.transaction,
            &project_script(),
            Amount::from_sat(60_000),
            &contract_key(&keys),
            &locked.contract,
            &secret(),
        )
        .unwrap();

        // Same signature, wrong preimage: falls through to the time-lock
        // branch, which the zero lock time does not satisfy.
        let key = contract_key(&keys);
        let sig = sign_legacy_input(
            &tx,
            0,
            &locked.contract.redeem_script(),
            EcdsaSighashType::AllPlusAnyoneCanPay,
            &key,
        )
        .unwrap();
        let forged = ContractSpend::Claim {
            secret: SecretToken::new([1; 32]),
        };
        tx.input[0].script_sig = forged
            .script_sig(&locked.contract, &sig, &public_key(&key))
            .unwrap();

        let err = verify_scripts(&tx, &[locked.transaction.output[0].clone()]).unwrap_err();
        assert!(err.is_verification());
    }

    #[test]
    fn test_correct_secret_ignores_lock_time() {
        let (keys, locked) = locked_pledge(23, 100_000, 60_000);
        let mut tx = craft_partial(
            &locked.transaction,
            &project_script(),
            Amount::from_sat(60_000),
            &contract_key(&keys),
            &locked.contract,
            &secret(),
        )
        .unwrap();

        // Non-final sequence with a lock time far past the contract's.
        tx.lock_time = absolute::LockTime::from_time(REFUND_LOCK_TIME + 1_000_000).unwrap();
        tx.input[0].sequence = Sequence::ENABLE_LOCKTIME_NO_RBF;
        let key = contract_key(&keys);
        let sig = sign_legacy_input(
            &tx,
            0,
            &locked.contract.redeem_script(),
            EcdsaSighashType::AllPlusAnyoneCanPay,
            &key,
        )
        .unwrap();
        tx.input[0].script_sig = ContractSpend::Claim { secret: secret() }
            .script_sig(&locked.contract, &sig, &public_key(&key))
            .unwrap();

        verify_scripts(&tx, &[locked.transaction.output[0].clone()]).unwrap();
    }

    #[test]
    fn test_not_partial() {
        let tx = Transaction {
            version: Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input: vec![
                TxIn {
                    previous_output: OutPoint::new(Txid::all_zeros(), 0),
                    ..Default::default()
                };
                2
            ],
            output: vec![],
        };
        assert!(matches!(
            pledge_input_from_partial(&tx, TxOut::NULL),
            Err(TxError::NotPartial(2))
        ));
    }
}
