//! Generation Client
//!
//! Turns a context snapshot and a task description into a validated [`Artifact`] by
//! calling the model through a [`RetryPolicy`]. Only transient provider failures are
//! retried. A response that does not match the artifact schema fails fast.

use crate::context::ContextSnapshot;
use crate::error::{ExhaustionReason, GenerationError, ProviderError};
use crate::provider::{ChatMessage, CompletionOptions, ModelClient};
use crate::retry::{RetryError, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are a careful software engineer. Using only the supplied \
context, write code that completes the task. Respond with a single JSON object of the form \
{\"content\": string, \"language\": string, \"path\": string or null, \"commentary\": \
{\"summary\": string, \"notes\": [string]}}. `content` holds the complete code. Do not wrap \
the object in markdown.";

/// Reviewer-facing explanation attached to generated code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commentary {
    pub summary: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Candidate code plus structured commentary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub content: String,
    pub language: String,
    #[serde(default)]
    pub path: Option<String>,
    pub commentary: Commentary,
}

impl Artifact {
    /// Parse and validate raw model output.
    pub fn parse(raw: &str) -> Result<Self, ProviderError> {
        let body = strip_code_fence(raw);
        let artifact: Artifact = serde_json::from_str(body).map_err(|e| {
            ProviderError::MalformedResponse(format!("response is not a valid artifact: {}", e))
        })?;
        artifact.validate()?;
        Ok(artifact)
    }

    fn validate(&self) -> Result<(), ProviderError> {
        if self.content.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(
                "artifact content is empty".to_string(),
            ));
        }
        if self.language.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(
                "artifact language is empty".to_string(),
            ));
        }
        if self.commentary.summary.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(
                "artifact commentary has no summary".to_string(),
            ));
        }
        Ok(())
    }
}

/// Drop a surrounding markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // skip the info string (e.g. "json")
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

impl From<RetryError<ProviderError>> for GenerationError {
    fn from(err: RetryError<ProviderError>) -> Self {
        let reason = match &err {
            RetryError::NonRetryable { .. } => ExhaustionReason::NonRetryable,
            RetryError::AttemptsExhausted { .. } => ExhaustionReason::AttemptsExhausted,
            RetryError::DeadlineExceeded { .. } => ExhaustionReason::DeadlineExceeded,
        };
        GenerationError::Exhausted {
            attempts: err.attempts(),
            reason,
            last_error: err.into_error(),
        }
    }
}

pub struct GenerationClient {
    model: Arc<dyn ModelClient>,
    policy: RetryPolicy,
    options: CompletionOptions,
}

impl GenerationClient {
    pub fn new(model: Arc<dyn ModelClient>, policy: RetryPolicy) -> Self {
        Self {
            model,
            policy,
            options: CompletionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Messages for one attempt.
    pub fn build_request(snapshot: &ContextSnapshot, task_description: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "## Context (snapshot {}, store version {})\n{}\n## Task\n{}\n",
                snapshot.id.short(),
                snapshot.store_version,
                snapshot.render(),
                task_description.trim()
            )),
        ]
    }

    pub async fn generate(
        &self,
        snapshot: &ContextSnapshot,
        task_description: &str,
    ) -> Result<Artifact, GenerationError> {
        let result = self
            .policy
            .run(|attempt| {
                // rebuilt every attempt
                let messages = Self::build_request(snapshot, task_description);
                let model = Arc::clone(&self.model);
                let options = self.options.clone();
                async move {
                    debug!(
                        attempt,
                        provider = model.provider_name(),
                        model = model.model_name(),
                        "Requesting generation"
                    );
                    let response = model.complete(messages, options).await?;
                    Artifact::parse(&response.content)
                }
            })
            .await;

        match result {
            Ok(artifact) => {
                info!(
                    snapshot_id = %snapshot.id.short(),
                    language = %artifact.language,
                    bytes = artifact.content.len(),
                    "Generated artifact"
                );
                Ok(artifact)
            }
            Err(err) => {
                let err = GenerationError::from(err);
                warn!(
                    attempts = err.attempts(),
                    reason = %err.reason(),
                    error = %err.last_error(),
                    "Generation exhausted"
                );
                Err(err)
            }
        }
    }
}
