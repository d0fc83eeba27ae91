//! Shared fakes and harness for integration tests.
//!
//! Every harness owns its sled database inside a `TempDir`; nothing touches the
//! network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use walk::context::{ContextSnapshot, ContextStore, Fragment, SledContextStore};
use walk::error::{ContextError, ProviderError};
use walk::feedback::FeedbackGate;
use walk::generation::GenerationClient;
use walk::pipeline::PipelineOrchestrator;
use walk::provider::{
    ChatMessage, CompletionOptions, CompletionResponse, ModelClient, TokenUsage,
};
use walk::retry::RetryPolicy;
use walk::store::SledPipelineStore;
use walk::types::{SnapshotId, StoreVersion};

pub const ARTIFACT: &str = r#"{"content":"pub fn retry() {}","language":"rust","path":"src/retry.rs","commentary":{"summary":"adds retry","notes":[]}}"#;

pub fn ok() -> Result<String, ProviderError> {
    Ok(ARTIFACT.to_string())
}

pub fn timeout() -> Result<String, ProviderError> {
    Err(ProviderError::Timeout("request timed out".to_string()))
}

/// Replays a script of responses and records every request.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    /// When set, each call parks until the gate is opened
    gate: Option<Arc<Notify>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn gated(script: Vec<Result<String, ProviderError>>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(script)
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Concatenated text of request `index`.
    pub fn request_text(&self, index: usize) -> String {
        self.requests.lock()[index]
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        self.requests.lock().push(messages);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidRequest("script exhausted".into())));
        next.map(|content| CompletionResponse {
            content,
            model: "scripted".to_string(),
            usage: TokenUsage::default(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// A context store whose backing service is down.
pub struct UnavailableContext;

impl ContextStore for UnavailableContext {
    fn current_version(&self) -> Result<StoreVersion, ContextError> {
        Err(ContextError::StoreUnavailable("connection refused".to_string()))
    }

    fn query(&self, _: &str, _: StoreVersion) -> Result<ContextSnapshot, ContextError> {
        Err(ContextError::StoreUnavailable("connection refused".to_string()))
    }

    fn snapshot(&self, id: &SnapshotId) -> Result<ContextSnapshot, ContextError> {
        Err(ContextError::SnapshotNotFound(id.to_string()))
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub model: Arc<ScriptedModel>,
    pub context: Arc<SledContextStore>,
    pub orchestrator: PipelineOrchestrator,
}

impl Harness {
    pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self::with_model(ScriptedModel::new(script))
    }

    pub fn with_model(model: ScriptedModel) -> Self {
        let dir = TempDir::new().unwrap();
        let model = Arc::new(model);
        let (context, orchestrator) = build(dir.path(), model.clone(), None);
        Self {
            dir,
            model,
            context,
            orchestrator,
        }
    }

    /// Same database, but with the context service unavailable.
    pub fn with_unavailable_context(script: Vec<Result<String, ProviderError>>) -> Self {
        let dir = TempDir::new().unwrap();
        let model = Arc::new(ScriptedModel::new(script));
        let (context, orchestrator) =
            build(dir.path(), model.clone(), Some(Arc::new(UnavailableContext)));
        Self {
            dir,
            model,
            context,
            orchestrator,
        }
    }

    /// Drop the orchestrator and open a fresh one over the same database.
    pub fn restart(self, script: Vec<Result<String, ProviderError>>) -> Self {
        let Harness {
            dir, orchestrator, context, ..
        } = self;
        drop(orchestrator);
        drop(context);
        let model = Arc::new(ScriptedModel::new(script));
        let (context, orchestrator) = build(dir.path(), model.clone(), None);
        Self {
            dir,
            model,
            context,
            orchestrator,
        }
    }

    pub fn publish(&self, fragments: &[(&str, &str)]) -> StoreVersion {
        let fragments = fragments
            .iter()
            .map(|(source, body)| Fragment::from_chunk(source, 0, 1, body.to_string()).unwrap())
            .collect();
        self.context.publish(fragments, "test").unwrap()
    }
}

fn build(
    path: &Path,
    model: Arc<ScriptedModel>,
    context_override: Option<Arc<dyn ContextStore>>,
) -> (Arc<SledContextStore>, PipelineOrchestrator) {
    let db = sled::open(path.join("store")).unwrap();
    let store = SledPipelineStore::shared(db.clone()).unwrap();
    let context = Arc::new(SledContextStore::new(db).unwrap());
    let reader: Arc<dyn ContextStore> = match context_override {
        Some(reader) => reader,
        None => context.clone(),
    };
    let generator = Arc::new(GenerationClient::new(model, RetryPolicy::immediate(3)));
    let gate = Arc::new(FeedbackGate::new(store.clone()));
    (
        context,
        PipelineOrchestrator::new(store, reader, generator, gate),
    )
}

/// Generous bound for tests that wait on background tasks.
pub const WAIT: Duration = Duration::from_secs(5);
