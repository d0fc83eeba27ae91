//! Run Store
//!
//! The persistence collaborator: the single source of truth for resuming runs.
//! Holds Run records (with a by-stage index), the append-only Attempt log, pending
//! review requests and cancellation flags.

pub mod persistence;

pub use persistence::SledPipelineStore;

use crate::error::StorageError;
use crate::feedback::PendingReview;
use crate::pipeline::{Attempt, AttemptOutcome, Run, Stage};
use crate::types::RunId;

/// Run and Attempt persistence
pub trait RunStore: Send + Sync {
    /// Insert or replace a run by id.
    fn upsert_run(&self, run: &Run) -> Result<(), StorageError>;

    fn get_run(&self, run_id: &RunId) -> Result<Option<Run>, StorageError>;

    /// All runs, newest first.
    fn list_runs(&self) -> Result<Vec<Run>, StorageError>;

    /// Runs currently in `stage`, newest first.
    fn list_runs_by_stage(&self, stage: Stage) -> Result<Vec<Run>, StorageError>;

    /// Append an attempt. Fails with `AttemptExists` if its sequence number is taken.
    fn append_attempt(&self, run_id: &RunId, attempt: &Attempt) -> Result<(), StorageError>;

    /// Attempts of a run in sequence order.
    fn list_attempts(&self, run_id: &RunId) -> Result<Vec<Attempt>, StorageError>;

    fn get_attempt(&self, run_id: &RunId, seq: u32) -> Result<Option<Attempt>, StorageError>;

    /// Move a pending attempt to its final outcome. Re-sealing with the same outcome
    /// is a no-op; any other change fails with `AttemptSealed`.
    fn seal_attempt(
        &self,
        run_id: &RunId,
        seq: u32,
        outcome: AttemptOutcome,
    ) -> Result<Attempt, StorageError>;

    /// Persist a cancellation request to be applied at the next safe boundary.
    fn request_cancellation(&self, run_id: &RunId) -> Result<(), StorageError>;

    fn cancellation_requested(&self, run_id: &RunId) -> Result<bool, StorageError>;

    fn clear_cancellation(&self, run_id: &RunId) -> Result<(), StorageError>;

    fn list_cancellations(&self) -> Result<Vec<RunId>, StorageError>;
}

/// Durable home of FeedbackGate requests
pub trait ReviewStore: Send + Sync {
    fn put_review(&self, review: &PendingReview) -> Result<(), StorageError>;

    fn get_review(&self, run_id: &RunId) -> Result<Option<PendingReview>, StorageError>;

    /// Returns whether a record was removed.
    fn remove_review(&self, run_id: &RunId) -> Result<bool, StorageError>;

    fn list_reviews(&self) -> Result<Vec<PendingReview>, StorageError>;
}
