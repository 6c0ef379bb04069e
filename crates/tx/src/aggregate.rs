//! Merging pledge inputs into the project's funding transaction.

use std::collections::HashSet;

use bitcoin::{absolute, transaction::Version, Amount, Script, Transaction, TxOut};
use satfund_primitives::pledge::PledgeInput;
use tracing::*;

use crate::{
    error::TxError,
    verify::{check_value_balance, sum_values, verify_scripts},
};

/// Result of trying to compile a project's pledges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Signed funding transaction paying the goal to the project.
    Ready(Transaction),

    /// Pledges do not yet reach the goal.
    NotReady { pledged: Amount, goal: Amount },
}

impl CompileOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Combines every pledge input, in the given order, into one transaction whose
/// sole output pays `fund_goal` to `project_script`. Pledged value beyond the
/// goal goes to fees.
pub fn compile(
    pledges: &[PledgeInput],
    project_script: &Script,
    fund_goal: Amount,
) -> Result<CompileOutcome, TxError> {
    let pledged = sum_values(pledges.iter().map(PledgeInput::value))?;
    if pledges.is_empty() || pledged < fund_goal {
        return Ok(CompileOutcome::NotReady {
            pledged,
            goal: fund_goal,
        });
    }

    let mut seen = HashSet::with_capacity(pledges.len());
    for pledge in pledges {
        if !seen.insert(pledge.outpoint()) {
            return Err(TxError::DuplicateInput(pledge.outpoint()));
        }
    }

    let tx = Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: pledges.iter().map(PledgeInput::to_txin).collect(),
        output: vec![TxOut {
            value: fund_goal,
            script_pubkey: project_script.to_owned(),
        }],
    };

    let prevouts: Vec<TxOut> = pledges.iter().map(|p| p.output.clone()).collect();
    verify_scripts(&tx, &prevouts)?;
    let fee = check_value_balance(&tx, &prevouts)?;

    info!(
        txid = %tx.compute_txid(),
        inputs = pledges.len(),
        %pledged,
        %fee,
        "compiled funding transaction"
    );
    Ok(CompileOutcome::Ready(tx))
}

#[cfg(test)]
mod tests {
    use bitcoin::{Amount, ScriptBuf};
    use satfund_primitives::pledge::PledgeInput;

    use super::*;
    use crate::{partial::*, test_utils::*};

    fn pledge(seed: u8, amount: u64, goal: Amount, project: &ScriptBuf) -> PledgeInput {
        let (keys, locked) = locked_pledge(seed, amount + MIN_FEE.to_sat(), amount);
        let partial = craft_partial(
            &locked.transaction,
            project,
            goal,
            &contract_key(&keys),
            &locked.contract,
            &secret(),
        )
        .unwrap();
        pledge_input_from_partial(&partial, locked.transaction.output[0].clone()).unwrap()
    }

    #[test]
    fn test_not_ready_below_goal() {
        let goal = Amount::from_sat(100_000);
        let project = project_script();
        let p = pledge(30, 40_000, goal, &project);

        let outcome = compile(&[p], &project, goal).unwrap();
        assert_eq!(
            outcome,
            CompileOutcome::NotReady {
                pledged: Amount::from_sat(40_000),
                goal,
            }
        );
        assert_eq!(
            compile(&[], &project, goal).unwrap(),
            CompileOutcome::NotReady {
                pledged: Amount::ZERO,
                goal
            }
        );
    }

    #[test]
    fn test_single_pledge_at_goal() {
        let goal = Amount::from_sat(100_000);
        let project = project_script();
        let p = pledge(31, 100_000, goal, &project);

        let CompileOutcome::Ready(tx) = compile(&[p.clone()], &project, goal).unwrap() else {
            panic!("expected a funding transaction");
        };
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.input[0], p.to_txin());
        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].value, goal);
        assert_eq!(tx.output[0].script_pubkey, project);
    }

    #[test]
    fn test_partial_survives_appended_inputs() {
        let goal = Amount::from_sat(100_000);
        let project = project_script();
        let first = pledge(32, 70_000, goal, &project);
        let second = pledge(33, 50_000, goal, &project);

        let CompileOutcome::Ready(tx) =
            compile(&[first.clone(), second.clone()], &project, goal).unwrap()
        else {
            panic!("expected a funding transaction");
        };

        // Acceptance order is kept and both signatures still verify.
        assert_eq!(tx.input[0].previous_output, first.outpoint());
        assert_eq!(tx.input[1].previous_output, second.outpoint());
        verify_scripts(&tx, &[first.output.clone(), second.output.clone()]).unwrap();
        assert_eq!(
            check_value_balance(&tx, &[first.output, second.output]).unwrap(),
            Amount::from_sat(20_000)
        );
    }

    #[test]
    fn test_partial_for_other_goal_breaks_signature() {
        let project = project_script();
        let p = pledge(34, 100_000, Amount::from_sat(90_000), &project);

        // Signed for a 90k output; compiling for 100k changes the committed output.
        let res = compile(&[p], &project, Amount::from_sat(100_000));
        assert!(matches!(res, Err(e) if e.is_verification()));
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let goal = Amount::from_sat(100_000);
        let project = project_script();
        let p = pledge(35, 60_000, goal, &project);

        let res = compile(&[p.clone(), p], &project, goal);
        assert!(matches!(res, Err(TxError::DuplicateInput(_))));
    }
}
