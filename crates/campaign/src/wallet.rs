//! Pledger side of the exchange.
//!
//! Turns the server's answers into signed transactions. Private keys stay in
//! [`PledgerKeys`]; only the resulting requests are sent to the server.

use bitcoin::{
    absolute, address::NetworkUnchecked, bip32::Xpub, Address, Amount, Network, PrivateKey,
    Script, Transaction, TxIn,
};
use satfund_contract::ContractScript;
use satfund_key_derivation::PledgerKeys;
use satfund_primitives::{roles::DerivationRole, secret::SecretToken};
use satfund_tx::{
    craft_locked_output, craft_partial, LockedOutput, LockedOutputParams, RefundParams, TxError,
};
use tracing::*;

use crate::{
    errors::{PledgeError, PledgeResult},
    messages::{InitialResponse, PledgeRequest, TransmitExactAmountResponse},
    validate::external_key_hash,
};

#[derive(Debug, Clone)]
pub struct PledgerWallet {
    keys: PledgerKeys,
}

impl PledgerWallet {
    pub fn new(keys: PledgerKeys) -> Self {
        Self { keys }
    }

    /// The key the server is registered with.
    pub fn account_xpub(&self) -> Xpub {
        self.keys.account_xpub()
    }

    /// Signs a transaction locking `amount` into the contract described by
    /// `quote`, and its refund.
    pub fn lock_funds(&self, quote: &InitialResponse, amount: Amount) -> PledgeResult<PledgeDraft> {
        let contract = ContractScript::new(
            quote.secret_hash,
            external_key_hash(&self.keys.account_xpub(), quote.external_index)?,
            absolute::LockTime::from_consensus(quote.lock_time),
        )?;
        let contract_key = self
            .keys
            .signing_key(DerivationRole::External, quote.external_index)?;
        let signing_keys = self.keys.signing_keys_for(&quote.inputs)?;
        let min_fee = Amount::from_sat(quote.min_fee);

        let locked = craft_locked_output(&LockedOutputParams {
            inputs: &quote.inputs,
            signing_keys: &signing_keys,
            amount,
            min_fee,
            contract,
            change_script: self
                .keys
                .address(DerivationRole::Change, quote.change_index)?
                .script_pubkey(),
            refund: RefundParams {
                refund_script: self
                    .keys
                    .address(DerivationRole::External, quote.external_index)?
                    .script_pubkey(),
                signing_key: contract_key,
                lock_time: absolute::LockTime::from_consensus(quote.refund_lock_time),
                min_fee,
            },
        })?;

        debug!(txid = %locked.transaction.compute_txid(), %amount, "locked pledge funds");
        Ok(PledgeDraft {
            locked,
            contract_key,
            amount,
            network: self.keys.network(),
        })
    }
}

/// A pledge between its locking transaction and its partial.
#[derive(Debug, Clone)]
pub struct PledgeDraft {
    locked: LockedOutput,
    contract_key: PrivateKey,
    amount: Amount,
    network: Network,
}

impl PledgeDraft {
    pub fn contract(&self) -> ContractScript {
        self.locked.contract
    }

    pub fn locked_tx(&self) -> &Transaction {
        &self.locked.transaction
    }

    pub fn refund_tx(&self) -> &Transaction {
        &self.locked.refund_transaction
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// The `transmitExactAmount` request handing both transactions over.
    pub fn lock_request(&self) -> PledgeRequest {
        PledgeRequest::transmit_exact_amount(self.locked_tx(), self.refund_tx())
    }

    /// Signs the locked output over to the project. The returned input can be
    /// combined with other pledgers' inputs into the funding transaction.
    pub fn sign_partial(
        &self,
        project_script: &Script,
        fund_goal: Amount,
        secret: &SecretToken,
    ) -> PledgeResult<TxIn> {
        let partial = craft_partial(
            self.locked_tx(),
            project_script,
            fund_goal,
            &self.contract_key,
            &self.locked.contract,
            secret,
        )?;
        partial
            .input
            .into_iter()
            .next()
            .ok_or(PledgeError::InvalidTransaction(TxError::NotPartial(0)))
    }

    /// The `transmitPartial` request answering `reply`.
    pub fn partial_request(&self, reply: &TransmitExactAmountResponse) -> PledgeResult<PledgeRequest> {
        let address = reply
            .address
            .parse::<Address<NetworkUnchecked>>()
            .map_err(|e| PledgeError::malformed(format!("project address: {e}")))?
            .require_network(self.network)
            .map_err(|e| PledgeError::malformed(format!("project address: {e}")))?;
        let input = self.sign_partial(
            &address.script_pubkey(),
            Amount::from_sat(reply.fund_goal),
            &reply.secret,
        )?;
        Ok(PledgeRequest::transmit_partial(
            &input,
            self.amount.to_sat(),
            self.refund_tx(),
        ))
    }
}
