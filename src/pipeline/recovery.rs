//! Restart recovery.
//!
//! Nothing is held in memory across processes, so a restart only has to reconcile
//! the side records with the runs they belong to: apply scheduled cancellations,
//! make sure every run in `AwaitingReview` has its review request and drop review
//! records whose run has settled. Runs caught mid-cycle need no repair; the next
//! `advance` redoes their current stage.

use super::orchestrator::PipelineOrchestrator;
use super::run::Stage;
use crate::error::PipelineError;
use crate::types::RunId;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Runs failed with `cancelled` from a persisted request
    pub cancelled: Vec<RunId>,
    /// Runs whose missing or stale review request was recreated
    pub reregistered: Vec<RunId>,
    /// Runs waiting for a human decision
    pub awaiting_review: Vec<RunId>,
    /// Runs in `ContextAssembly` or `Generating`, ready for `advance`
    pub resumable: Vec<RunId>,
    /// Review records dropped because their run is terminal or gone
    pub discarded_reviews: Vec<RunId>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.cancelled.is_empty()
            && self.reregistered.is_empty()
            && self.discarded_reviews.is_empty()
    }
}

impl PipelineOrchestrator {
    /// Reconcile persisted state after a restart. Safe to run at any time.
    pub async fn recover(&self) -> Result<RecoveryReport, PipelineError> {
        let mut report = RecoveryReport::default();

        for run_id in self.store.list_cancellations()? {
            let _guard = self.locks.lock(&run_id).await;
            match self.store.get_run(&run_id)? {
                Some(run) if !run.is_terminal() => {
                    self.commit_cancel(run)?;
                    report.cancelled.push(run_id.clone());
                }
                _ => self.store.clear_cancellation(&run_id)?,
            }
        }

        for run in self.store.list_runs_by_stage(Stage::AwaitingReview)? {
            let _guard = self.locks.lock(&run.id).await;
            // re-read under the lock; another task may have moved it on
            let Some(run) = self.store.get_run(&run.id)? else {
                continue;
            };
            if run.stage != Stage::AwaitingReview {
                continue;
            }
            if self.ensure_review_requested(&run)? {
                report.reregistered.push(run.id.clone());
            }
            report.awaiting_review.push(run.id);
        }

        for review in self.gate.list()? {
            let settled = match self.store.get_run(&review.run_id)? {
                Some(run) => run.is_terminal(),
                None => true,
            };
            if settled && self.gate.discard(&review.run_id)? {
                warn!(run_id = %review.run_id, "Discarded orphaned review request");
                report.discarded_reviews.push(review.run_id);
            }
        }

        for stage in [Stage::ContextAssembly, Stage::Generating] {
            report.resumable.extend(
                self.store
                    .list_runs_by_stage(stage)?
                    .into_iter()
                    .map(|run| run.id),
            );
        }

        info!(
            cancelled = report.cancelled.len(),
            reregistered = report.reregistered.len(),
            awaiting_review = report.awaiting_review.len(),
            resumable = report.resumable.len(),
            discarded_reviews = report.discarded_reviews.len(),
            "Recovery complete"
        );
        Ok(report)
    }
}
