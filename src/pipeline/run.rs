//! Run and Attempt records.

use crate::context::ContextSnapshot;
use crate::error::{ExhaustionReason, GenerationError, PipelineError};
use crate::generation::Artifact;
use crate::types::{now_millis, RunId, SnapshotId, StoreVersion};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ContextAssembly,
    Generating,
    AwaitingReview,
    Integrated,
    Failed,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::ContextAssembly,
        Stage::Generating,
        Stage::AwaitingReview,
        Stage::Integrated,
        Stage::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Integrated | Stage::Failed)
    }

    /// Edges of the stage graph. Any non-terminal stage may fail.
    pub fn can_transition_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::ContextAssembly, Stage::Generating)
                | (Stage::Generating, Stage::AwaitingReview)
                | (Stage::AwaitingReview, Stage::ContextAssembly)
                | (Stage::AwaitingReview, Stage::Integrated)
        ) || (!self.is_terminal() && next == Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ContextAssembly => "context_assembly",
            Stage::Generating => "generating",
            Stage::AwaitingReview => "awaiting_review",
            Stage::Integrated => "integrated",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| format!("unknown stage '{}'", s))
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum FailureReason {
    Cancelled,
    /// `reason` keeps fail-fast (non-retryable) distinct from running out of
    /// attempts or time
    GenerationExhausted {
        reason: ExhaustionReason,
        error: String,
    },
    IterationLimit,
    Rejected(String),
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Cancelled => "cancelled",
            FailureReason::GenerationExhausted { .. } => "generation-exhausted",
            FailureReason::IterationLimit => "iteration-limit",
            FailureReason::Rejected(_) => "rejected",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Cancelled => f.write_str("cancelled"),
            FailureReason::GenerationExhausted { reason, error } => {
                write!(f, "generation-exhausted ({}): {}", reason, error)
            }
            FailureReason::IterationLimit => f.write_str("iteration-limit"),
            FailureReason::Rejected(reason) => f.write_str(reason),
        }
    }
}

/// Set exactly once, when the run reaches a terminal stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalResult {
    Integrated { attempt_seq: u32 },
    Failed { reason: FailureReason },
}

/// External review decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "kebab-case")]
pub enum FeedbackDecision {
    Approve,
    RequestChanges { comments: String },
    Reject { reason: String },
}

impl FeedbackDecision {
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self {
            FeedbackDecision::Approve => Ok(()),
            FeedbackDecision::RequestChanges { comments } if comments.trim().is_empty() => Err(
                PipelineError::InvalidDecision("request-changes requires comments".to_string()),
            ),
            FeedbackDecision::Reject { reason } if reason.trim().is_empty() => Err(
                PipelineError::InvalidDecision("reject requires a reason".to_string()),
            ),
            _ => Ok(()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeedbackDecision::Approve => "approve",
            FeedbackDecision::RequestChanges { .. } => "request-changes",
            FeedbackDecision::Reject { .. } => "reject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Pending,
    Approved,
    ChangesRequested,
    Rejected,
    GenerationFailed,
}

impl AttemptOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptOutcome::Pending => "pending",
            AttemptOutcome::Approved => "approved",
            AttemptOutcome::ChangesRequested => "changes-requested",
            AttemptOutcome::Rejected => "rejected",
            AttemptOutcome::GenerationFailed => "generation-failed",
        }
    }

    pub fn for_decision(decision: &FeedbackDecision) -> Self {
        match decision {
            FeedbackDecision::Approve => AttemptOutcome::Approved,
            FeedbackDecision::RequestChanges { .. } => AttemptOutcome::ChangesRequested,
            FeedbackDecision::Reject { .. } => AttemptOutcome::Rejected,
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only reference into the context store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub snapshot_id: SnapshotId,
    pub store_version: StoreVersion,
    pub fragment_count: usize,
}

impl SnapshotRef {
    pub fn of(snapshot: &ContextSnapshot) -> Self {
        Self {
            snapshot_id: snapshot.id.clone(),
            store_version: snapshot.store_version,
            fragment_count: snapshot.len(),
        }
    }
}

/// One generation cycle. Content never changes after creation; the outcome moves
/// from `Pending` to a final value once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub seq: u32,
    pub iteration: u32,
    pub snapshot: SnapshotRef,
    pub artifact: Option<Artifact>,
    pub outcome: AttemptOutcome,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub error: Option<String>,
    /// Set on `GenerationFailed` attempts
    #[serde(default)]
    pub exhaustion: Option<ExhaustionReason>,
    pub created_at_ms: u64,
    pub resolved_at_ms: Option<u64>,
}

impl Attempt {
    pub fn generated(
        seq: u32,
        iteration: u32,
        snapshot: SnapshotRef,
        artifact: Artifact,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            seq,
            iteration,
            snapshot,
            artifact: Some(artifact),
            outcome: AttemptOutcome::Pending,
            warnings,
            error: None,
            exhaustion: None,
            created_at_ms: now_millis(),
            resolved_at_ms: None,
        }
    }

    pub fn failed(
        seq: u32,
        iteration: u32,
        snapshot: SnapshotRef,
        error: &GenerationError,
        warnings: Vec<String>,
    ) -> Self {
        let now = now_millis();
        Self {
            seq,
            iteration,
            snapshot,
            artifact: None,
            outcome: AttemptOutcome::GenerationFailed,
            warnings,
            error: Some(error.to_string()),
            exhaustion: Some(error.reason()),
            created_at_ms: now,
            resolved_at_ms: Some(now),
        }
    }
}

/// Context assembled for the cycle in progress, carried from `ContextAssembly`
/// to `Generating`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleContext {
    pub snapshot: SnapshotRef,
    pub query: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub at_ms: u64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub task_description: String,
    pub stage: Stage,
    /// Current cycle, starting at 1
    pub iteration: u32,
    pub max_iterations: u32,
    /// Attempts appended so far; the next attempt gets `attempt_count + 1`
    pub attempt_count: u32,
    /// Reviewer comments from request-changes decisions, oldest first
    #[serde(default)]
    pub feedback: Vec<String>,
    pub cycle: Option<CycleContext>,
    pub result: Option<TerminalResult>,
    #[serde(default)]
    pub history: Vec<StageTransition>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub archived_at_ms: Option<u64>,
}

impl Run {
    /// A fresh run in `ContextAssembly`. Rejects blank descriptions and a zero
    /// iteration bound.
    pub fn new(task_description: &str, max_iterations: u32) -> Result<Self, PipelineError> {
        if task_description.trim().is_empty() {
            return Err(PipelineError::InvalidTask(
                "task description cannot be empty".to_string(),
            ));
        }
        if max_iterations == 0 {
            return Err(PipelineError::InvalidTask(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        let now = now_millis();
        Ok(Self {
            id: RunId::new(),
            task_description: task_description.to_string(),
            stage: Stage::ContextAssembly,
            iteration: 1,
            max_iterations,
            attempt_count: 0,
            feedback: Vec::new(),
            cycle: None,
            result: None,
            history: Vec::new(),
            created_at_ms: now,
            updated_at_ms: now,
            archived_at_ms: None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Task description with all reviewer feedback appended; used as the
    /// context query and the generation task.
    pub fn effective_description(&self) -> String {
        if self.feedback.is_empty() {
            return self.task_description.clone();
        }
        let mut out = self.task_description.clone();
        out.push_str("\n\nReviewer feedback:");
        for (i, comment) in self.feedback.iter().enumerate() {
            out.push_str(&format!("\n{}. {}", i + 1, comment.trim()));
        }
        out
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match &self.result {
            Some(TerminalResult::Failed { reason }) => Some(reason),
            _ => None,
        }
    }

    pub(crate) fn transition(
        &mut self,
        to: Stage,
        note: Option<String>,
    ) -> Result<(), PipelineError> {
        if !self.stage.can_transition_to(to) {
            return Err(PipelineError::IllegalTransition {
                run_id: self.id.clone(),
                from: self.stage.to_string(),
                to: to.to_string(),
            });
        }
        let now = now_millis();
        self.history.push(StageTransition {
            from: self.stage,
            to,
            at_ms: now,
            note,
        });
        self.stage = to;
        self.updated_at_ms = now;
        if to.is_terminal() {
            self.cycle = None;
            self.archived_at_ms = Some(now);
        }
        Ok(())
    }

    pub(crate) fn fail(&mut self, reason: FailureReason) -> Result<(), PipelineError> {
        let note = reason.to_string();
        self.transition(Stage::Failed, Some(note))?;
        self.result = Some(TerminalResult::Failed { reason });
        Ok(())
    }

    pub(crate) fn integrate(&mut self, attempt_seq: u32) -> Result<(), PipelineError> {
        self.transition(Stage::Integrated, Some(format!("attempt {}", attempt_seq)))?;
        self.result = Some(TerminalResult::Integrated { attempt_seq });
        Ok(())
    }
}
