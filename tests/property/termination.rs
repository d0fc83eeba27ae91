//! Property-based tests for run termination under arbitrary review decisions

use async_trait::async_trait;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;
use walk::context::SledContextStore;
use walk::error::ProviderError;
use walk::feedback::FeedbackGate;
use walk::generation::GenerationClient;
use walk::pipeline::{FailureReason, FeedbackDecision, PipelineOrchestrator, Stage};
use walk::provider::{
    ChatMessage, CompletionOptions, CompletionResponse, ModelClient, TokenUsage,
};
use walk::retry::RetryPolicy;
use walk::store::SledPipelineStore;

const ARTIFACT: &str = r#"{"content":"pub fn retry() {}","language":"rust","commentary":{"summary":"adds retry","notes":[]}}"#;

/// Always answers with a valid artifact.
struct SteadyModel;

#[async_trait]
impl ModelClient for SteadyModel {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        Ok(CompletionResponse {
            content: ARTIFACT.to_string(),
            model: "steady".to_string(),
            usage: TokenUsage::default(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "steady"
    }

    fn model_name(&self) -> &str {
        "steady"
    }
}

fn orchestrator(dir: &TempDir) -> PipelineOrchestrator {
    let db = sled::open(dir.path()).unwrap();
    let store = SledPipelineStore::shared(db.clone()).unwrap();
    let context = Arc::new(SledContextStore::new(db).unwrap());
    let generator = Arc::new(GenerationClient::new(
        Arc::new(SteadyModel),
        RetryPolicy::immediate(3),
    ));
    let gate = Arc::new(FeedbackGate::new(store.clone()));
    PipelineOrchestrator::new(store, context, generator, gate)
}

fn decision() -> impl Strategy<Value = FeedbackDecision> {
    prop_oneof![
        Just(FeedbackDecision::Approve),
        "[a-z]{1,12}".prop_map(|comments| FeedbackDecision::RequestChanges { comments }),
        "[a-z]{1,12}".prop_map(|reason| FeedbackDecision::Reject { reason }),
    ]
}

/// Reviewers answer from `decisions`, then keep requesting changes once it runs
/// out. The run must still settle within `max_iterations` attempts.
#[test]
fn test_runs_terminate_within_iteration_bound() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(24));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runner
        .run(
            &(1u32..5, prop::collection::vec(decision(), 0..8)),
            |(max_iterations, decisions)| {
                let dir = TempDir::new().unwrap();
                let orch = orchestrator(&dir);
                runtime.block_on(async {
                    let id = orch.submit("add retry", max_iterations).unwrap();
                    let mut answers = decisions.into_iter();
                    let mut rounds = 0;
                    loop {
                        let report = orch.drive(&id).await.unwrap();
                        if report.stage.is_terminal() {
                            break;
                        }
                        rounds += 1;
                        assert!(rounds <= max_iterations, "run did not terminate");
                        let next = answers.next().unwrap_or(FeedbackDecision::RequestChanges {
                            comments: "more".to_string(),
                        });
                        orch.resolve(&id, next).await.unwrap();
                    }

                    let status = orch.status(&id).unwrap();
                    assert!(status.attempts.len() as u32 <= max_iterations);
                    assert!(status.run.result.is_some());
                    if status.run.failure_reason() == Some(&FailureReason::IterationLimit) {
                        assert_eq!(status.attempts.len() as u32, max_iterations);
                    }
                    if status.run.stage == Stage::Integrated {
                        assert!(status.pending_review.is_none());
                    }
                });
                Ok(())
            },
        )
        .unwrap();
}
