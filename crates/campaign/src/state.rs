//! The tri-stage pledge exchange as a state machine.
//!
//! Transitions are pure: the service loads the state and context, performs
//! chain queries up front, and persists and broadcasts whatever a transition
//! returns.

use bitcoin::{bip32::Xpub, Address, Amount, Network, Transaction, TxIn};
use satfund_db_types::types::{DerivationIndices, PendingPledgeEntry, ProjectEntry};
use satfund_primitives::{ids::ProjectId, pledge::PledgeInput, utxo::UnspentOutput};
use satfund_tx::choose_inputs;

use crate::{
    errors::{PledgeError, PledgeResult},
    messages::{
        decode_hex, InitialResponse, TransmitExactAmountResponse, STAGE_INITIAL,
        STAGE_TRANSMIT_EXACT_AMOUNT, STAGE_TRANSMIT_PARTIAL,
    },
    params::PledgeParams,
    validate::{expected_contract, validate_locked_tx, validate_partial, validate_refund_tx},
};

/// Where a user's pledge to one project stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PledgeState {
    /// Nothing in flight.
    Idle,

    /// Funds locked, waiting for the partial.
    Locked(PendingPledgeEntry),
}

impl PledgeState {
    pub fn from_pending(pending: Option<PendingPledgeEntry>) -> Self {
        pending.map_or(Self::Idle, Self::Locked)
    }

    /// Stage the state accepts next.
    pub fn expected_stage(&self) -> &'static str {
        match self {
            Self::Idle => STAGE_INITIAL,
            Self::Locked(_) => STAGE_TRANSMIT_PARTIAL,
        }
    }

    fn ensure_idle(&self, got: &'static str) -> PledgeResult<()> {
        match self {
            Self::Idle => Ok(()),
            Self::Locked(_) => Err(PledgeError::OutOfOrder {
                expected: self.expected_stage(),
                got,
            }),
        }
    }

    /// Quotes the inputs and contract terms for pledging `amount`. Does not
    /// change state.
    pub fn initial(
        &self,
        ctx: &PledgeContext<'_>,
        amount: Amount,
        balance: Amount,
        utxos: &[UnspentOutput],
    ) -> PledgeResult<InitialResponse> {
        self.ensure_idle(STAGE_INITIAL)?;
        ctx.ensure_open()?;
        if amount == Amount::ZERO {
            return Err(PledgeError::malformed("pledge amount must be positive"));
        }
        if balance < amount {
            return Err(PledgeError::InsufficientFunds {
                needed: amount,
                available: balance,
            });
        }
        let inputs = choose_inputs(utxos, amount, ctx.params.min_fee)?;

        let deadline = ctx.project.deadline;
        Ok(InitialResponse {
            inputs,
            secret_hash: ctx.project.secret.hash(),
            deadline,
            lock_time: ctx.params.contract_lock_time(deadline)?.to_consensus_u32(),
            refund_lock_time: ctx.params.refund_lock_time(deadline)?.to_consensus_u32(),
            external_index: ctx.indices.external,
            change_index: ctx.indices.change,
            min_fee: ctx.params.min_fee.to_sat(),
        })
    }

    /// Accepts the signed locking transaction and its refund.
    pub fn transmit_exact_amount(
        self,
        ctx: &PledgeContext<'_>,
        serialized_tx: &str,
        refund_tx: &str,
    ) -> PledgeResult<(Self, LockedPledge)> {
        self.ensure_idle(STAGE_TRANSMIT_EXACT_AMOUNT)?;
        ctx.ensure_open()?;

        let locked_tx: Transaction = decode_hex("locking transaction", serialized_tx)?;
        let refund_tx: Transaction = decode_hex("refund transaction", refund_tx)?;

        let contract = expected_contract(ctx.xpub, ctx.indices.external, ctx.project, ctx.params)?;
        let amount = validate_locked_tx(&locked_tx, &contract)?;
        validate_refund_tx(
            &refund_tx,
            &locked_tx,
            ctx.params.refund_lock_time(ctx.project.deadline)?,
        )?;

        let address = Address::from_script(&ctx.project.payout_script(), ctx.network)
            .map_err(|e| PledgeError::malformed(format!("project payout script: {e}")))?;
        let response = TransmitExactAmountResponse {
            address: address.to_string(),
            fund_goal: ctx.project.fund_goal,
            secret: ctx.project.secret.clone(),
        };
        let pending = PendingPledgeEntry::new(
            ctx.project_id,
            amount,
            ctx.indices,
            &locked_tx,
            &refund_tx,
        );

        Ok((
            Self::Locked(pending),
            LockedPledge {
                locked_tx,
                response,
            },
        ))
    }

    /// Accepts the pledger's partial input.
    pub fn transmit_partial(
        self,
        ctx: &PledgeContext<'_>,
        input: &str,
        amount: u64,
        refund_tx: &str,
    ) -> PledgeResult<(Self, AcceptedPledge)> {
        let Self::Locked(pending) = self else {
            return Err(PledgeError::OutOfOrder {
                expected: self.expected_stage(),
                got: STAGE_TRANSMIT_PARTIAL,
            });
        };
        ctx.ensure_open()?;

        let txin: TxIn = decode_hex("partial input", input)?;
        let refund: Transaction = decode_hex("refund transaction", refund_tx)?;
        let locked_tx = pending
            .try_to_locked_tx()
            .map_err(|e| PledgeError::malformed(format!("stored locking transaction: {e}")))?;
        let stored_refund = pending
            .try_to_refund_tx()
            .map_err(|e| PledgeError::malformed(format!("stored refund transaction: {e}")))?;

        if amount != pending.amount {
            return Err(PledgeError::malformed(format!(
                "amount {amount} differs from the locked {}",
                pending.amount
            )));
        }
        if refund != stored_refund {
            return Err(PledgeError::malformed(
                "refund differs from the one submitted with the locking transaction",
            ));
        }

        let input = validate_partial(txin, &locked_tx, ctx.project)?;
        if input.value().to_sat() != amount {
            return Err(PledgeError::malformed(format!(
                "locked output holds {}, not {amount} sat",
                input.value()
            )));
        }

        Ok((
            Self::Idle,
            AcceptedPledge {
                input,
                refund_tx: refund,
                amount: Amount::from_sat(amount),
            },
        ))
    }
}

/// Everything a transition needs to know about the user and the project.
#[derive(Debug, Clone, Copy)]
pub struct PledgeContext<'a> {
    pub network: Network,
    pub xpub: &'a Xpub,
    /// The user's next unused indices.
    pub indices: DerivationIndices,
    pub project_id: ProjectId,
    pub project: &'a ProjectEntry,
    pub params: &'a PledgeParams,
    /// Current unix time.
    pub now: u64,
}

impl PledgeContext<'_> {
    /// Whether the project still takes pledges.
    pub fn is_open(&self) -> bool {
        !self.project.is_funded() && self.now < self.project.deadline
    }

    fn ensure_open(&self) -> PledgeResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(PledgeError::ProjectClosed(self.project_id))
        }
    }
}

/// Output of [`PledgeState::transmit_exact_amount`].
#[derive(Debug, Clone)]
pub struct LockedPledge {
    /// To be broadcast once the pending pledge is stored.
    pub locked_tx: Transaction,
    pub response: TransmitExactAmountResponse,
}

/// Output of [`PledgeState::transmit_partial`].
#[derive(Debug, Clone)]
pub struct AcceptedPledge {
    pub input: PledgeInput,
    pub refund_tx: Transaction,
    pub amount: Amount,
}
