//! Error types for the walk generation pipeline.

use crate::types::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Attempt {seq} not found for run {run_id}")]
    AttemptNotFound { run_id: RunId, seq: u32 },

    #[error("Attempt {seq} already exists for run {run_id}")]
    AttemptExists { run_id: RunId, seq: u32 },

    #[error("Attempt {seq} of run {run_id} is already sealed as {outcome}")]
    AttemptSealed {
        run_id: RunId,
        seq: u32,
        outcome: String,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Context store and ingestion errors
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Context store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unknown store version: {0}")]
    UnknownVersion(u64),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Fragment not found: {0}")]
    FragmentNotFound(String),

    #[error("Invalid fragment: {0}")]
    InvalidFragment(String),

    #[error("Ingestion failed for {path}: {message}")]
    Ingest { path: String, message: String },
}

/// Classified failure of a single generative-model call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider request timed out: {0}")]
    Timeout(String),

    #[error("Provider rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("Provider server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Provider connection failed: {0}")]
    Connection(String),

    #[error("Provider rejected request: {0}")]
    InvalidRequest(String),

    #[error("Provider authentication failed: {0}")]
    AuthFailed(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Timeouts, rate limits, dropped connections and 5xx responses may succeed
    /// on a later attempt. Everything else is a property of the request itself.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::ServerError { .. }
                | ProviderError::Connection(_)
        )
    }
}

/// Why a generation stopped retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExhaustionReason {
    /// The last failure was not retryable; no further attempts were made.
    NonRetryable,
    /// The attempt bound was reached.
    AttemptsExhausted,
    /// The next backoff would have crossed the total elapsed-time bound.
    DeadlineExceeded,
}

impl fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExhaustionReason::NonRetryable => "non-retryable",
            ExhaustionReason::AttemptsExhausted => "attempts exhausted",
            ExhaustionReason::DeadlineExceeded => "deadline exceeded",
        };
        f.write_str(s)
    }
}

/// Generation errors surfaced by the generation client
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Generation exhausted after {attempts} attempt(s) ({reason}): {last_error}")]
    Exhausted {
        attempts: u32,
        reason: ExhaustionReason,
        last_error: ProviderError,
    },
}

impl GenerationError {
    pub fn attempts(&self) -> u32 {
        match self {
            GenerationError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn reason(&self) -> ExhaustionReason {
        match self {
            GenerationError::Exhausted { reason, .. } => *reason,
        }
    }

    /// True when the call failed fast on a non-retryable error rather than
    /// running out of attempts or time.
    pub fn is_non_retryable(&self) -> bool {
        self.reason() == ExhaustionReason::NonRetryable
    }

    pub fn last_error(&self) -> &ProviderError {
        match self {
            GenerationError::Exhausted { last_error, .. } => last_error,
        }
    }
}

/// Feedback gate errors
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Run {run_id} already has an outstanding review request for attempt {attempt_seq}")]
    DuplicateRequest { run_id: RunId, attempt_seq: u32 },

    #[error("Run {0} has no outstanding review request")]
    NoPendingRequest(RunId),

    #[error("Review request for run {0} has already been resolved")]
    AlreadyResolved(RunId),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Orchestrator errors, surfaced to the human interface
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Run {run_id} is in stage {stage} and cannot accept a review decision")]
    InvalidStateForDecision { run_id: RunId, stage: String },

    #[error("Illegal transition {from} -> {to} for run {run_id}")]
    IllegalTransition {
        run_id: RunId,
        from: String,
        to: String,
    },

    #[error("Feedback gate error: {0}")]
    Gate(#[from] GateError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Response codes of the human-interface surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    InternalError,
    RunNotFound,
    InvalidStateForDecision,
    ValidationError,
}

impl StatusCode {
    pub fn exit_code(self) -> i32 {
        match self {
            StatusCode::Success => 0,
            StatusCode::InternalError => 1,
            StatusCode::RunNotFound => 2,
            StatusCode::InvalidStateForDecision => 3,
            StatusCode::ValidationError => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Success => "success",
            StatusCode::InternalError => "internal-error",
            StatusCode::RunNotFound => "run-not-found",
            StatusCode::InvalidStateForDecision => "invalid-state-for-decision",
            StatusCode::ValidationError => "validation-error",
        }
    }
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::RunNotFound(_) => StatusCode::RunNotFound,
            PipelineError::Storage(StorageError::RunNotFound(_)) => StatusCode::RunNotFound,
            PipelineError::InvalidStateForDecision { .. } => StatusCode::InvalidStateForDecision,
            PipelineError::Gate(GateError::NoPendingRequest(_))
            | PipelineError::Gate(GateError::AlreadyResolved(_)) => {
                StatusCode::InvalidStateForDecision
            }
            PipelineError::InvalidTask(_)
            | PipelineError::InvalidDecision(_)
            | PipelineError::InvalidArgument(_)
            | PipelineError::Context(ContextError::FragmentNotFound(_))
            | PipelineError::Config(_) => StatusCode::ValidationError,
            PipelineError::IllegalTransition { .. }
            | PipelineError::Gate(_)
            | PipelineError::Context(_)
            | PipelineError::Storage(_) => StatusCode::InternalError,
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}
