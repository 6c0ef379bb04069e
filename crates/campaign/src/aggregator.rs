//! Combines a project's pledges into its funding transaction once the goal is
//! reached.

use std::{collections::HashMap, fmt, sync::Arc};

use bitcoin::Txid;
use parking_lot::Mutex;
use satfund_btcio::Broadcaster;
use satfund_db_types::traits::{PledgeDatabase, ProjectDatabase};
use satfund_primitives::{ids::ProjectId, pledge::PledgeInput};
use satfund_tx::{compile, CompileOutcome};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::*;

use crate::errors::{PledgeError, PledgeResult};

/// Outcome of an aggregation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingStatus {
    /// The funding transaction was accepted, now or earlier.
    Funded(Txid),

    /// Pledges do not cover the goal yet.
    NotReady { pledged: u64, goal: u64 },
}

/// Exclusive hold on one project's pledge set.
///
/// Pledges to the project are finalized and aggregated only while it is held.
pub struct ProjectGuard {
    project: ProjectId,
    _guard: OwnedMutexGuard<()>,
}

impl ProjectGuard {
    pub fn project(&self) -> ProjectId {
        self.project
    }
}

impl fmt::Debug for ProjectGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectGuard")
            .field("project", &self.project)
            .finish()
    }
}

pub struct Aggregator<D> {
    db: Arc<D>,
    broadcaster: Arc<dyn Broadcaster>,
    locks: Mutex<HashMap<ProjectId, Arc<AsyncMutex<()>>>>,
}

impl<D> fmt::Debug for Aggregator<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("locked_projects", &self.locks.lock().len())
            .finish_non_exhaustive()
    }
}

impl<D> Aggregator<D>
where
    D: ProjectDatabase + PledgeDatabase,
{
    pub fn new(db: Arc<D>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            db,
            broadcaster,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for exclusive hold of `project`.
    pub async fn lock(&self, project: ProjectId) -> ProjectGuard {
        let lock = self.locks.lock().entry(project).or_default().clone();
        ProjectGuard {
            project,
            _guard: lock.lock_owned().await,
        }
    }

    /// Compiles and broadcasts the funding transaction of `project` if its
    /// pledges cover the goal.
    pub async fn try_compile(&self, project: ProjectId) -> PledgeResult<FundingStatus> {
        let guard = self.lock(project).await;
        self.compile_locked(&guard).await
    }

    /// [`try_compile`](Self::try_compile) for a caller already holding the
    /// project.
    #[instrument(skip_all, fields(project = %guard.project()))]
    pub async fn compile_locked(&self, guard: &ProjectGuard) -> PledgeResult<FundingStatus> {
        let id = guard.project();
        let project = self
            .db
            .get_project(id)?
            .ok_or(PledgeError::UnknownProject(id))?;
        if let Some(txid) = project.status.funding_txid() {
            debug!(%txid, "project already funded");
            return Ok(FundingStatus::Funded(txid));
        }

        let pledges = self
            .db
            .get_pledges(id)?
            .iter()
            .map(|p| p.try_to_pledge_input())
            .collect::<Result<Vec<PledgeInput>, _>>()
            .map_err(|e| PledgeError::malformed(format!("stored pledge: {e}")))?;

        let tx = match compile(&pledges, &project.payout_script(), project.fund_goal())? {
            CompileOutcome::Ready(tx) => tx,
            CompileOutcome::NotReady { pledged, goal } => {
                debug!(%pledged, %goal, "goal not reached");
                return Ok(FundingStatus::NotReady {
                    pledged: pledged.to_sat(),
                    goal: goal.to_sat(),
                });
            }
        };

        let txid = tx.compute_txid();
        let resp = self
            .broadcaster
            .send_tx(&tx)
            .await
            .map_err(|e| PledgeError::BroadcastFailure {
                status: None,
                message: e.to_string(),
            })?;
        if !resp.is_accepted() {
            warn!(%txid, status = resp.status, message = %resp.message, "funding transaction rejected");
            return Err(PledgeError::BroadcastFailure {
                status: Some(resp.status),
                message: resp.message,
            });
        }

        self.db.mark_funded(id, txid)?;
        info!(%txid, pledges = pledges.len(), "project funded");
        Ok(FundingStatus::Funded(txid))
    }
}
