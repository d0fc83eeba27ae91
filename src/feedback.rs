//! Feedback Gate
//!
//! Holds at most one outstanding review request per run. A request is persisted when a
//! run reaches `AwaitingReview`; `resolve` records the human decision on it. The
//! orchestrator later reads the decision, commits the resulting transition and only
//! then discards the record, so a crash between the two never loses a decision.
//!
//! Nobody waits inside the gate. A run parks in `AwaitingReview` with no lock held
//! and the next `advance` after `resolve` picks the decision up.

use crate::error::GateError;
use crate::pipeline::{Attempt, FeedbackDecision};
use crate::store::ReviewStore;
use crate::types::{now_millis, RunId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Outstanding (or resolved but not yet consumed) review request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReview {
    pub run_id: RunId,
    pub attempt_seq: u32,
    pub requested_at_ms: u64,
    pub decision: Option<FeedbackDecision>,
    pub resolved_at_ms: Option<u64>,
}

impl PendingReview {
    pub fn is_resolved(&self) -> bool {
        self.decision.is_some()
    }
}

pub struct FeedbackGate {
    store: Arc<dyn ReviewStore>,
}

impl FeedbackGate {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self { store }
    }

    /// Register a review request for `attempt`.
    ///
    /// A record left over from an earlier attempt is replaced; a record for the same
    /// attempt is a `DuplicateRequest`.
    pub fn request(&self, run_id: &RunId, attempt: &Attempt) -> Result<(), GateError> {
        if let Some(existing) = self.store.get_review(run_id)? {
            if existing.attempt_seq == attempt.seq {
                return Err(GateError::DuplicateRequest {
                    run_id: run_id.clone(),
                    attempt_seq: attempt.seq,
                });
            }
            debug!(
                run_id = %run_id,
                stale_attempt = existing.attempt_seq,
                "Replacing stale review request"
            );
        }

        self.store.put_review(&PendingReview {
            run_id: run_id.clone(),
            attempt_seq: attempt.seq,
            requested_at_ms: now_millis(),
            decision: None,
            resolved_at_ms: None,
        })?;
        info!(run_id = %run_id, attempt = attempt.seq, "Review requested");
        Ok(())
    }

    /// Deliver a decision for the outstanding request.
    pub fn resolve(&self, run_id: &RunId, decision: FeedbackDecision) -> Result<(), GateError> {
        let mut review = self
            .store
            .get_review(run_id)?
            .ok_or_else(|| GateError::NoPendingRequest(run_id.clone()))?;
        if review.is_resolved() {
            return Err(GateError::AlreadyResolved(run_id.clone()));
        }

        info!(
            run_id = %run_id,
            attempt = review.attempt_seq,
            decision = decision.label(),
            "Review resolved"
        );
        review.decision = Some(decision);
        review.resolved_at_ms = Some(now_millis());
        self.store.put_review(&review)?;
        Ok(())
    }

    pub fn pending(&self, run_id: &RunId) -> Result<Option<PendingReview>, GateError> {
        Ok(self.store.get_review(run_id)?)
    }

    /// Every request record, oldest first.
    pub fn list(&self) -> Result<Vec<PendingReview>, GateError> {
        Ok(self.store.list_reviews()?)
    }

    /// Decision for `attempt_seq`, if one has been delivered. A record belonging to
    /// another attempt is treated as absent.
    pub fn decision_for(
        &self,
        run_id: &RunId,
        attempt_seq: u32,
    ) -> Result<Option<FeedbackDecision>, GateError> {
        Ok(self
            .store
            .get_review(run_id)?
            .filter(|r| r.attempt_seq == attempt_seq)
            .and_then(|r| r.decision))
    }

    /// Drop the record once its decision has been committed. Returns whether one existed.
    pub fn discard(&self, run_id: &RunId) -> Result<bool, GateError> {
        Ok(self.store.remove_review(run_id)?)
    }
}
