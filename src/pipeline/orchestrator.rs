//! Pipeline Orchestrator
//!
//! Drives runs through `ContextAssembly -> Generating -> AwaitingReview -> {Integrated |
//! Failed}` one persisted transition at a time. `advance` is the unit of resumability:
//! it loads the run from the store, performs exactly one transition, persists it and
//! returns. Operations on one run are serialized through [`RunLockManager`]; the lock is
//! held across the model call but never across human review.

use crate::concurrency::RunLockManager;
use crate::context::{ContextSnapshot, ContextStore};
use crate::error::{ExhaustionReason, GateError, PipelineError, StorageError};
use crate::feedback::{FeedbackGate, PendingReview};
use crate::generation::GenerationClient;
use crate::pipeline::run::{
    Attempt, AttemptOutcome, CycleContext, FailureReason, FeedbackDecision, Run, SnapshotRef,
    Stage,
};
use crate::store::RunStore;
use crate::types::RunId;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a single `advance` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    Transitioned { from: Stage, to: Stage },
    /// The run is in `AwaitingReview` and no decision has been delivered yet
    AwaitingDecision,
    AlreadyTerminal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvanceReport {
    pub run_id: RunId,
    #[serde(flatten)]
    pub outcome: AdvanceOutcome,
    pub stage: Stage,
    pub iteration: u32,
}

impl AdvanceReport {
    fn new(run: &Run, outcome: AdvanceOutcome) -> Self {
        Self {
            run_id: run.id.clone(),
            outcome,
            stage: run.stage,
            iteration: run.iteration,
        }
    }

    /// True when further `advance` calls cannot make progress without outside input.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.outcome,
            AdvanceOutcome::AwaitingDecision | AdvanceOutcome::AlreadyTerminal
        ) || self.stage.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The run is now `Failed(cancelled)`
    Cancelled,
    /// Another operation holds the run; cancellation applies at its next boundary
    Scheduled,
    AlreadyTerminal,
}

/// A run together with everything needed to inspect it
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub run: Run,
    pub attempts: Vec<Attempt>,
    pub pending_review: Option<PendingReview>,
    pub cancellation_requested: bool,
}

enum ReviewStep {
    Applied(Run),
    Waiting(Run),
}

pub struct PipelineOrchestrator {
    pub(crate) store: Arc<dyn RunStore>,
    context: Arc<dyn ContextStore>,
    generator: Arc<GenerationClient>,
    pub(crate) gate: Arc<FeedbackGate>,
    pub(crate) locks: RunLockManager,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn RunStore>,
        context: Arc<dyn ContextStore>,
        generator: Arc<GenerationClient>,
        gate: Arc<FeedbackGate>,
    ) -> Self {
        Self {
            store,
            context,
            generator,
            gate,
            locks: RunLockManager::new(),
        }
    }

    pub fn gate(&self) -> &FeedbackGate {
        &self.gate
    }

    /// Create and persist a run in `ContextAssembly`.
    pub fn submit(
        &self,
        task_description: &str,
        max_iterations: u32,
    ) -> Result<RunId, PipelineError> {
        let run = Run::new(task_description, max_iterations)?;
        self.store.upsert_run(&run)?;
        info!(
            run_id = %run.id,
            max_iterations,
            "Run submitted"
        );
        Ok(run.id)
    }

    /// Perform exactly one stage transition and persist it. A no-op on terminal runs.
    pub async fn advance(&self, run_id: &RunId) -> Result<AdvanceReport, PipelineError> {
        let _guard = self.locks.lock(run_id).await;
        let run = self.load(run_id)?;

        if run.is_terminal() {
            debug!(run_id = %run_id, stage = %run.stage, "Advance on terminal run is a no-op");
            // a cancel that lost the race to the final commit
            self.store.clear_cancellation(run_id)?;
            return Ok(AdvanceReport::new(&run, AdvanceOutcome::AlreadyTerminal));
        }

        let from = run.stage;
        if self.store.cancellation_requested(run_id)? {
            let run = self.commit_cancel(run)?;
            return Ok(AdvanceReport::new(
                &run,
                AdvanceOutcome::Transitioned { from, to: run.stage },
            ));
        }

        let run = match from {
            Stage::ContextAssembly => self.assemble_context(run)?,
            Stage::Generating => self.generate(run).await?,
            Stage::AwaitingReview => match self.apply_review(run)? {
                ReviewStep::Applied(run) => run,
                ReviewStep::Waiting(run) => {
                    return Ok(AdvanceReport::new(&run, AdvanceOutcome::AwaitingDecision));
                }
            },
            Stage::Integrated | Stage::Failed => {
                return Ok(AdvanceReport::new(&run, AdvanceOutcome::AlreadyTerminal));
            }
        };

        Ok(AdvanceReport::new(
            &run,
            AdvanceOutcome::Transitioned { from, to: run.stage },
        ))
    }

    /// Fail a non-terminal run with reason `cancelled`.
    ///
    /// If another operation holds the run, the request is persisted and applied at
    /// that operation's next commit point (or the next `advance` / `recover`).
    pub fn cancel(&self, run_id: &RunId) -> Result<CancelOutcome, PipelineError> {
        let run = self.load(run_id)?;
        if run.is_terminal() {
            if let Some(_guard) = self.locks.try_lock(run_id) {
                self.store.clear_cancellation(run_id)?;
            }
            return Ok(CancelOutcome::AlreadyTerminal);
        }

        if let Some(_guard) = self.locks.try_lock(run_id) {
            return self.cancel_locked(run_id);
        }

        self.store.request_cancellation(run_id)?;
        // the holder may have released between the first try and the flag write
        if let Some(_guard) = self.locks.try_lock(run_id) {
            return self.cancel_locked(run_id);
        }

        info!(run_id = %run_id, stage = %run.stage, "Cancellation scheduled");
        Ok(CancelOutcome::Scheduled)
    }

    fn cancel_locked(&self, run_id: &RunId) -> Result<CancelOutcome, PipelineError> {
        let run = self.load(run_id)?;
        if run.is_terminal() {
            self.store.clear_cancellation(run_id)?;
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        self.commit_cancel(run)?;
        Ok(CancelOutcome::Cancelled)
    }

    /// Deliver a review decision for a run waiting in `AwaitingReview`.
    pub async fn resolve(
        &self,
        run_id: &RunId,
        decision: FeedbackDecision,
    ) -> Result<(), PipelineError> {
        decision.validate()?;
        let _guard = self.locks.lock(run_id).await;
        let run = self.load(run_id)?;
        if run.stage != Stage::AwaitingReview {
            return Err(PipelineError::InvalidStateForDecision {
                run_id: run_id.clone(),
                stage: run.stage.to_string(),
            });
        }
        self.ensure_review_requested(&run)?;
        self.gate.resolve(run_id, decision)?;
        Ok(())
    }

    pub fn status(&self, run_id: &RunId) -> Result<RunStatus, PipelineError> {
        let run = self.load(run_id)?;
        let attempts = self.store.list_attempts(run_id)?;
        let pending_review = self.gate.pending(run_id)?;
        let cancellation_requested = self.store.cancellation_requested(run_id)?;
        Ok(RunStatus {
            run,
            attempts,
            pending_review,
            cancellation_requested,
        })
    }

    pub fn list(&self, stage: Option<Stage>) -> Result<Vec<Run>, PipelineError> {
        let runs = match stage {
            Some(stage) => self.store.list_runs_by_stage(stage)?,
            None => self.store.list_runs()?,
        };
        Ok(runs)
    }

    /// Advance until the run is terminal or waiting for a human decision.
    pub async fn drive(&self, run_id: &RunId) -> Result<AdvanceReport, PipelineError> {
        loop {
            let report = self.advance(run_id).await?;
            if report.is_settled() {
                if report.stage.is_terminal() {
                    self.locks.release(run_id);
                }
                return Ok(report);
            }
        }
    }

    /// Drive several runs concurrently. Results are returned in input order.
    pub async fn drive_all(
        &self,
        run_ids: &[RunId],
    ) -> Vec<(RunId, Result<AdvanceReport, PipelineError>)> {
        let drives = run_ids.iter().map(|id| async move {
            let result = self.drive(id).await;
            (id.clone(), result)
        });
        join_all(drives).await
    }

    pub(crate) fn load(&self, run_id: &RunId) -> Result<Run, PipelineError> {
        self.store
            .get_run(run_id)?
            .ok_or_else(|| PipelineError::RunNotFound(run_id.clone()))
    }

    /// Query the context store, downgrading any failure to an empty snapshot and a warning.
    fn query_context(&self, run_id: &RunId, query: &str) -> (ContextSnapshot, Vec<String>) {
        let result = self
            .context
            .current_version()
            .and_then(|version| self.context.query(query, version));
        match result {
            Ok(snapshot) => (snapshot, Vec::new()),
            Err(err) => {
                warn!(
                    run_id = %run_id,
                    error = %err,
                    "Context store unavailable, continuing with empty snapshot"
                );
                (
                    ContextSnapshot::empty(query, 0),
                    vec![format!("context unavailable: {}", err)],
                )
            }
        }
    }

    /// Reload the snapshot pinned for this cycle. Empty snapshots are rebuilt locally.
    fn load_snapshot(
        &self,
        run_id: &RunId,
        cycle: &CycleContext,
        warnings: &mut Vec<String>,
    ) -> ContextSnapshot {
        if cycle.snapshot.fragment_count == 0 {
            return ContextSnapshot::empty(&cycle.query, cycle.snapshot.store_version);
        }
        match self.context.snapshot(&cycle.snapshot.snapshot_id) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(
                    run_id = %run_id,
                    snapshot_id = %cycle.snapshot.snapshot_id.short(),
                    error = %err,
                    "Pinned snapshot unavailable, continuing with empty snapshot"
                );
                warnings.push(format!("snapshot unavailable: {}", err));
                ContextSnapshot::empty(&cycle.query, cycle.snapshot.store_version)
            }
        }
    }

    /// `ContextAssembly -> Generating`
    fn assemble_context(&self, mut run: Run) -> Result<Run, PipelineError> {
        let query = run.effective_description();
        let (snapshot, warnings) = self.query_context(&run.id, &query);
        let snapshot_ref = SnapshotRef::of(&snapshot);
        let note = format!(
            "snapshot {} at version {} ({} fragments)",
            snapshot.id.short(),
            snapshot.store_version,
            snapshot.len()
        );
        run.cycle = Some(CycleContext {
            snapshot: snapshot_ref,
            query,
            warnings,
        });
        self.commit(&mut run, Stage::Generating, Some(note))?;
        Ok(run)
    }

    /// `Generating -> AwaitingReview`, or `Failed(generation-exhausted)`
    async fn generate(&self, mut run: Run) -> Result<Run, PipelineError> {
        let seq = run.attempt_count + 1;

        // a crash after appending the attempt but before saving the run
        if let Some(orphan) = self.store.get_attempt(&run.id, seq)? {
            return self.adopt_attempt(run, orphan);
        }

        let cycle = match run.cycle.clone() {
            Some(cycle) => cycle,
            None => {
                let query = run.effective_description();
                let (snapshot, warnings) = self.query_context(&run.id, &query);
                CycleContext {
                    snapshot: SnapshotRef::of(&snapshot),
                    query,
                    warnings,
                }
            }
        };
        let mut warnings = cycle.warnings.clone();
        let snapshot = self.load_snapshot(&run.id, &cycle, &mut warnings);
        let snapshot_ref = SnapshotRef::of(&snapshot);

        let result = self.generator.generate(&snapshot, &cycle.query).await;

        if self.store.cancellation_requested(&run.id)? {
            return self.commit_cancel(run);
        }

        let attempt = match result {
            Ok(artifact) => Attempt::generated(seq, run.iteration, snapshot_ref, artifact, warnings),
            Err(err) => Attempt::failed(seq, run.iteration, snapshot_ref, &err, warnings),
        };
        self.store.append_attempt(&run.id, &attempt)?;
        self.adopt_attempt(run, attempt)
    }

    /// Move the run past a freshly appended attempt.
    fn adopt_attempt(&self, mut run: Run, attempt: Attempt) -> Result<Run, PipelineError> {
        run.attempt_count = attempt.seq;
        match attempt.outcome {
            AttemptOutcome::GenerationFailed => {
                let reason = FailureReason::GenerationExhausted {
                    reason: attempt
                        .exhaustion
                        .unwrap_or(ExhaustionReason::AttemptsExhausted),
                    error: attempt
                        .error
                        .clone()
                        .unwrap_or_else(|| "generation failed".to_string()),
                };
                self.commit_failure(&mut run, reason)?;
            }
            _ => {
                self.commit(
                    &mut run,
                    Stage::AwaitingReview,
                    Some(format!("attempt {}", attempt.seq)),
                )?;
                self.ensure_review_requested(&run)?;
            }
        }
        Ok(run)
    }

    /// `AwaitingReview -> {ContextAssembly | Integrated | Failed}`
    fn apply_review(&self, mut run: Run) -> Result<ReviewStep, PipelineError> {
        let seq = run.attempt_count;
        let Some(decision) = self.gate.decision_for(&run.id, seq)? else {
            self.ensure_review_requested(&run)?;
            return Ok(ReviewStep::Waiting(run));
        };

        self.store
            .seal_attempt(&run.id, seq, AttemptOutcome::for_decision(&decision))?;

        match decision {
            FeedbackDecision::Approve => {
                run.integrate(seq)?;
                self.persist(&run, Stage::AwaitingReview)?;
            }
            FeedbackDecision::RequestChanges { comments } => {
                if run.iteration >= run.max_iterations {
                    self.commit_failure(&mut run, FailureReason::IterationLimit)?;
                } else {
                    run.feedback.push(comments);
                    run.iteration += 1;
                    let note = format!("changes requested, starting iteration {}", run.iteration);
                    self.commit(&mut run, Stage::ContextAssembly, Some(note))?;
                }
            }
            FeedbackDecision::Reject { reason } => {
                self.commit_failure(&mut run, FailureReason::Rejected(reason))?;
            }
        }

        self.gate.discard(&run.id)?;
        Ok(ReviewStep::Applied(run))
    }

    /// Register the review request for the run's latest attempt unless it already
    /// exists. Returns whether a request was created.
    pub(crate) fn ensure_review_requested(&self, run: &Run) -> Result<bool, PipelineError> {
        let seq = run.attempt_count;
        if let Some(existing) = self.gate.pending(&run.id)? {
            if existing.attempt_seq == seq {
                return Ok(false);
            }
        }
        let attempt = self
            .store
            .get_attempt(&run.id, seq)?
            .ok_or_else(|| StorageError::AttemptNotFound {
                run_id: run.id.clone(),
                seq,
            })?;
        match self.gate.request(&run.id, &attempt) {
            Ok(()) => Ok(true),
            Err(GateError::DuplicateRequest { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn commit_cancel(&self, mut run: Run) -> Result<Run, PipelineError> {
        self.commit_failure(&mut run, FailureReason::Cancelled)?;
        self.store.clear_cancellation(&run.id)?;
        self.gate.discard(&run.id)?;
        Ok(run)
    }

    fn commit_failure(&self, run: &mut Run, reason: FailureReason) -> Result<(), PipelineError> {
        let from = run.stage;
        run.fail(reason)?;
        self.persist(run, from)
    }

    fn commit(&self, run: &mut Run, to: Stage, note: Option<String>) -> Result<(), PipelineError> {
        let from = run.stage;
        run.transition(to, note)?;
        self.persist(run, from)
    }

    fn persist(&self, run: &Run, from: Stage) -> Result<(), PipelineError> {
        self.store.upsert_run(run)?;
        match run.failure_reason() {
            Some(reason) => info!(
                run_id = %run.id,
                from = %from,
                to = %run.stage,
                iteration = run.iteration,
                reason = %reason,
                "Run failed"
            ),
            None => info!(
                run_id = %run.id,
                from = %from,
                to = %run.stage,
                iteration = run.iteration,
                "Run transitioned"
            ),
        }
        Ok(())
    }
}
