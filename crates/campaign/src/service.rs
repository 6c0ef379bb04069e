//! The pledge service: runs the exchange's state machine against storage,
//! the chain API and the refund scheduler.

use std::{fmt, sync::Arc};

use bitcoin::{bip32::Xpub, Amount, Transaction};
use satfund_btcio::{Broadcaster, ChainQuery, RefundScheduler};
use satfund_db_types::{
    traits::CampaignDatabase,
    types::{PendingPledgeEntry, PledgeEntry, ProjectEntry, RefundJobEntry, UserEntry},
};
use satfund_key_derivation::KeyError;
use satfund_primitives::{
    ids::{ProjectId, UserId},
    time::Clock,
};
use tracing::*;

use crate::{
    aggregator::{Aggregator, FundingStatus},
    errors::{PledgeError, PledgeResult},
    messages::{PartialStatus, PledgeRequest, PledgeResponse},
    params::PledgeParams,
    projects::{get_project_info, ProjectInfo},
    state::{PledgeContext, PledgeState},
};

pub struct PledgeService<D> {
    db: Arc<D>,
    chain: Arc<dyn ChainQuery>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    refunds: RefundScheduler,
    aggregator: Aggregator<D>,
    params: PledgeParams,
}

impl<D> fmt::Debug for PledgeService<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PledgeService")
            .field("params", &self.params)
            .field("refunds", &self.refunds)
            .finish_non_exhaustive()
    }
}

/// A user and project loaded for one request.
struct Loaded {
    xpub: Xpub,
    user: UserEntry,
    project: ProjectEntry,
    state: PledgeState,
}

impl<D: CampaignDatabase> PledgeService<D> {
    pub fn new(
        db: Arc<D>,
        chain: Arc<dyn ChainQuery>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        refunds: RefundScheduler,
        params: PledgeParams,
    ) -> Self {
        let aggregator = Aggregator::new(db.clone(), broadcaster.clone());
        Self {
            db,
            chain,
            broadcaster,
            clock,
            refunds,
            aggregator,
            params,
        }
    }

    pub fn db(&self) -> &Arc<D> {
        &self.db
    }

    pub fn params(&self) -> &PledgeParams {
        &self.params
    }

    pub fn aggregator(&self) -> &Aggregator<D> {
        &self.aggregator
    }

    pub fn project_info(&self, id: ProjectId) -> PledgeResult<ProjectInfo> {
        get_project_info(self.db.as_ref(), id, self.params.network)
    }

    /// Handles one stage of `user`'s pledge to `project`.
    #[instrument(skip(self, request), fields(stage = request.stage()))]
    pub async fn handle(
        &self,
        user: UserId,
        project: ProjectId,
        request: PledgeRequest,
    ) -> PledgeResult<PledgeResponse> {
        let res = match request {
            PledgeRequest::Initial { amount } => self.initial(user, project, amount).await,
            PledgeRequest::TransmitExactAmount {
                serialized_tx,
                refund_tx,
            } => {
                self.transmit_exact_amount(user, project, &serialized_tx, &refund_tx)
                    .await
            }
            PledgeRequest::TransmitPartial {
                input,
                amount,
                refund_tx,
            } => {
                self.transmit_partial(user, project, &input, amount, &refund_tx)
                    .await
            }
        };
        if let Err(err) = &res {
            if err.is_client_error() {
                debug!(%err, "pledge request rejected");
            } else {
                warn!(%err, "pledge request failed");
            }
        }
        res
    }

    fn load(&self, user: UserId, project: ProjectId) -> PledgeResult<Loaded> {
        let user_entry = self
            .db
            .get_user(user)?
            .ok_or(PledgeError::UnknownUser(user))?;
        let project_entry = self
            .db
            .get_project(project)?
            .ok_or(PledgeError::UnknownProject(project))?;
        let xpub = user_entry.try_to_xpub().map_err(KeyError::from)?;
        let state = PledgeState::from_pending(self.db.get_pending_pledge(user, project)?);
        Ok(Loaded {
            xpub,
            user: user_entry,
            project: project_entry,
            state,
        })
    }

    fn context<'a>(&'a self, project: ProjectId, loaded: &'a Loaded) -> PledgeContext<'a> {
        PledgeContext {
            network: self.params.network,
            xpub: &loaded.xpub,
            indices: loaded.user.indices,
            project_id: project,
            project: &loaded.project,
            params: &self.params,
            now: self.clock.now(),
        }
    }

    async fn initial(
        &self,
        user: UserId,
        project: ProjectId,
        amount: u64,
    ) -> PledgeResult<PledgeResponse> {
        let loaded = self.load(user, project)?;
        let ctx = self.context(project, &loaded);
        let amount = Amount::from_sat(amount);

        let balance = self
            .chain
            .get_balance(&loaded.xpub)
            .await
            .map_err(PledgeError::ChainQuery)?;
        if balance < amount {
            return Err(PledgeError::InsufficientFunds {
                needed: amount,
                available: balance,
            });
        }
        let utxos = self
            .chain
            .get_unspent(&loaded.xpub)
            .await
            .map_err(PledgeError::ChainQuery)?;

        let quote = loaded.state.initial(&ctx, amount, balance, &utxos)?;
        debug!(%user, %project, %amount, inputs = quote.inputs.len(), "quoted pledge");
        Ok(PledgeResponse::Initial(quote))
    }

    async fn transmit_exact_amount(
        &self,
        user: UserId,
        project: ProjectId,
        serialized_tx: &str,
        refund_tx: &str,
    ) -> PledgeResult<PledgeResponse> {
        let loaded = self.load(user, project)?;
        let ctx = self.context(project, &loaded);
        let (next, locked) = loaded
            .state
            .clone()
            .transmit_exact_amount(&ctx, serialized_tx, refund_tx)?;
        let PledgeState::Locked(pending) = next else {
            return Err(PledgeError::malformed("locking did not produce a pending pledge"));
        };

        // Indices are consumed before anything reaches the network.
        let indices = self.db.begin_pledge(user, ctx.indices, pending)?;

        let txid = locked.locked_tx.compute_txid();
        if let Err(err) = self.broadcast(&locked.locked_tx).await {
            self.db.discard_pending_pledge(user, project)?;
            return Err(err);
        }

        info!(%user, %project, %txid, ?indices, "pledge funds locked");
        Ok(PledgeResponse::TransmitExactAmount(locked.response))
    }

    async fn transmit_partial(
        &self,
        user: UserId,
        project: ProjectId,
        input: &str,
        amount: u64,
        refund_tx: &str,
    ) -> PledgeResult<PledgeResponse> {
        let guard = self.aggregator.lock(project).await;

        // Loaded under the project lock so the funded status and the pledged
        // total are current.
        let loaded = self.load(user, project)?;
        let ctx = self.context(project, &loaded);
        let accepted = match loaded
            .state
            .clone()
            .transmit_partial(&ctx, input, amount, refund_tx)
        {
            Ok((_, accepted)) => accepted,
            Err(PledgeError::ProjectClosed(id)) => {
                if let PledgeState::Locked(pending) = &loaded.state {
                    self.release_pending(user, project, &loaded.project, pending)?;
                }
                return Err(PledgeError::ProjectClosed(id));
            }
            Err(err) => return Err(err),
        };

        let fire_time = self.params.refund_time(loaded.project.deadline);
        let job = RefundJobEntry::new(Some(project), &accepted.refund_tx, fire_time, 0);
        let (total, job_id) = self.db.finalize_pledge(
            user,
            project,
            accepted.amount.to_sat(),
            PledgeEntry::new(user, &accepted.input),
            job.clone(),
        )?;
        self.refunds.arm(job_id, job);
        info!(%user, %project, amount = %accepted.amount, %total, %job_id, "pledge accepted");

        if total < loaded.project.fund_goal {
            return Ok(PledgeResponse::TransmitPartial(PartialStatus::Submitted));
        }

        // The pledge is stored either way. A failed attempt is reported to the
        // pledger and retried on the next pledge or through a manual compile.
        let status = match self.aggregator.compile_locked(&guard).await {
            Ok(FundingStatus::Funded(txid)) => PartialStatus::Funded { txid },
            Ok(FundingStatus::NotReady { .. }) => PartialStatus::Submitted,
            Err(err) => {
                warn!(%project, %err, "aggregation failed after accepting pledge");
                PartialStatus::aggregation_failed(&err)
            }
        };
        Ok(PledgeResponse::TransmitPartial(status))
    }

    /// Drops a pending pledge to a closed project and schedules its refund,
    /// since the locked funds will never be aggregated.
    fn release_pending(
        &self,
        user: UserId,
        project: ProjectId,
        entry: &ProjectEntry,
        pending: &PendingPledgeEntry,
    ) -> PledgeResult<()> {
        let refund = pending
            .try_to_refund_tx()
            .map_err(|e| PledgeError::malformed(format!("stored refund transaction: {e}")))?;
        let fire_time = self.params.refund_time(entry.deadline);
        self.refunds.schedule_refund(&refund, fire_time, 0)?;
        self.db.discard_pending_pledge(user, project)?;
        info!(%user, %project, txid = %refund.compute_txid(), "project closed, refund scheduled for pending pledge");
        Ok(())
    }

    async fn broadcast(&self, tx: &Transaction) -> PledgeResult<()> {
        let resp = self
            .broadcaster
            .send_tx(tx)
            .await
            .map_err(|e| PledgeError::BroadcastFailure {
                status: None,
                message: e.to_string(),
            })?;
        if resp.is_accepted() {
            Ok(())
        } else {
            Err(PledgeError::BroadcastFailure {
                status: Some(resp.status),
                message: resp.message,
            })
        }
    }

    /// Re-arms persisted refund jobs. Call once at startup.
    pub fn restore_refunds(&self) -> PledgeResult<usize> {
        Ok(self.refunds.restore()?.len())
    }
}
