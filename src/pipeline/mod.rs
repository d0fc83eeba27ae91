//! Pipeline domain: the run state machine, its orchestrator and restart recovery.

pub mod orchestrator;
pub mod recovery;
pub mod run;

pub use orchestrator::{
    AdvanceOutcome, AdvanceReport, CancelOutcome, PipelineOrchestrator, RunStatus,
};
pub use recovery::RecoveryReport;
pub use run::{
    Attempt, AttemptOutcome, CycleContext, FailureReason, FeedbackDecision, Run, SnapshotRef,
    Stage, StageTransition, TerminalResult,
};
