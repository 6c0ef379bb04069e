//! Refund scheduler.
//!
//! Each refund job is driven by its own task through
//! `Scheduled -> Broadcasting -> {Done | Scheduled(retry + 1) | Failed}`, with
//! every transition persisted so jobs survive restarts.

use std::{fmt, sync::Arc, time::Duration};

use bitcoin::Transaction;
use satfund_db_types::{
    traits::RefundJobDatabase,
    types::{RefundJobEntry, RefundJobStatus},
    DbResult,
};
use satfund_primitives::time::Clock;
use tokio::{task::JoinHandle, time::sleep};
use tracing::*;

use crate::{
    client::{BroadcastResponse, Broadcaster},
    error::ClientResult,
};

/// Default number of retries after the first broadcast attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between broadcast attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundSchedulerConfig {
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for RefundSchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// How a single broadcast attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BroadcastOutcome {
    Accepted,
    /// The contract output was already spent, normally by the funding
    /// transaction. Nothing is left to refund.
    InputsSpent,
    Rejected(String),
}

impl BroadcastOutcome {
    pub(crate) fn classify(res: &ClientResult<BroadcastResponse>) -> Self {
        match res {
            Ok(resp) if resp.is_accepted() => Self::Accepted,
            Ok(resp) if resp.is_inputs_spent() => Self::InputsSpent,
            Ok(resp) => Self::Rejected(format!("status {}: {}", resp.status, resp.message)),
            Err(e) => Self::Rejected(e.to_string()),
        }
    }
}

/// Job state after an attempt ended with `outcome`.
pub(crate) fn next_entry(
    entry: &RefundJobEntry,
    outcome: &BroadcastOutcome,
    config: &RefundSchedulerConfig,
) -> RefundJobEntry {
    let mut next = entry.clone();
    match outcome {
        BroadcastOutcome::Accepted | BroadcastOutcome::InputsSpent => {
            next.status = RefundJobStatus::Done;
        }
        BroadcastOutcome::Rejected(_) => {
            let retry_count = entry.retry_count.saturating_add(1);
            if retry_count > config.max_retries {
                next.status = RefundJobStatus::Failed;
            } else {
                next.retry_count = retry_count;
                next.fire_time = entry
                    .fire_time
                    .saturating_add(config.retry_backoff.as_secs());
                next.status = RefundJobStatus::Scheduled;
            }
        }
    }
    next
}

struct Inner {
    db: Arc<dyn RefundJobDatabase>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    config: RefundSchedulerConfig,
}

/// Broadcasts refund transactions at their fire time, retrying failed
/// attempts with a fixed backoff.
///
/// Cheap to clone. Arming jobs spawns tokio tasks, so it must be used from
/// within a runtime.
#[derive(Clone)]
pub struct RefundScheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for RefundScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefundScheduler")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl RefundScheduler {
    pub fn new(
        db: Arc<dyn RefundJobDatabase>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        config: RefundSchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                broadcaster,
                clock,
                config,
            }),
        }
    }

    pub fn config(&self) -> &RefundSchedulerConfig {
        &self.inner.config
    }

    /// Persists a job broadcasting `tx` at `fire_time` and arms it.
    ///
    /// Returns `false`, creating nothing, once `retry_count` exceeds the
    /// configured maximum.
    pub fn schedule_refund(
        &self,
        tx: &Transaction,
        fire_time: u64,
        retry_count: u32,
    ) -> DbResult<bool> {
        if retry_count > self.inner.config.max_retries {
            warn!(txid = %tx.compute_txid(), %retry_count, "refund retry limit reached");
            return Ok(false);
        }
        let entry = RefundJobEntry::new(None, tx, fire_time, retry_count);
        let job_id = self.inner.db.put_refund_job(entry.clone())?;
        self.arm(job_id, entry);
        Ok(true)
    }

    /// Arms a job that is already persisted.
    pub fn arm(&self, job_id: u64, entry: RefundJobEntry) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(err) = run_job(&inner, job_id, entry).await {
                error!(%job_id, %err, "refund job aborted on database error");
            }
        })
    }

    /// Re-arms every unfinished job, e.g. after a restart. Jobs caught
    /// mid-broadcast are attempted again.
    pub fn restore(&self) -> DbResult<Vec<JoinHandle<()>>> {
        let mut jobs = self
            .inner
            .db
            .get_refund_jobs_by_status(RefundJobStatus::Scheduled)?;
        jobs.extend(
            self.inner
                .db
                .get_refund_jobs_by_status(RefundJobStatus::Broadcasting)?,
        );
        info!(count = jobs.len(), "restoring refund jobs");
        Ok(jobs
            .into_iter()
            .map(|(id, entry)| self.arm(id, entry))
            .collect())
    }
}

async fn run_job(inner: &Inner, job_id: u64, mut entry: RefundJobEntry) -> DbResult<()> {
    loop {
        let delay = entry.fire_time.saturating_sub(inner.clock.now());
        debug!(%job_id, %delay, retry_count = entry.retry_count, "refund job waiting");
        sleep(Duration::from_secs(delay)).await;

        entry.status = RefundJobStatus::Broadcasting;
        inner.db.update_refund_job(job_id, entry.clone())?;

        let outcome = match entry.try_to_tx() {
            Ok(tx) => BroadcastOutcome::classify(&inner.broadcaster.send_tx(&tx).await),
            Err(e) => {
                // Undecodable jobs can never succeed.
                error!(%job_id, %e, "refund job holds an invalid transaction");
                entry.status = RefundJobStatus::Failed;
                inner.db.update_refund_job(job_id, entry)?;
                return Ok(());
            }
        };

        entry = next_entry(&entry, &outcome, &inner.config);
        inner.db.update_refund_job(job_id, entry.clone())?;

        match (&outcome, entry.status) {
            (BroadcastOutcome::Accepted, _) => {
                info!(%job_id, "refund transaction accepted");
                return Ok(());
            }
            (BroadcastOutcome::InputsSpent, _) => {
                info!(%job_id, "refund input already spent, nothing to refund");
                return Ok(());
            }
            (BroadcastOutcome::Rejected(reason), RefundJobStatus::Failed) => {
                error!(%job_id, %reason, "retry limit reached, giving up on refund transaction");
                return Ok(());
            }
            (BroadcastOutcome::Rejected(reason), _) => {
                warn!(
                    %job_id,
                    %reason,
                    retry_count = entry.retry_count,
                    fire_time = entry.fire_time,
                    "refund broadcast failed, rescheduling"
                );
            }
        }
    }
}
