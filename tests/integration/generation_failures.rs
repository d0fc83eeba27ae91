use super::support::{ok, timeout, Harness};
use walk::error::{ExhaustionReason, ProviderError};
use walk::pipeline::{AttemptOutcome, FailureReason, Stage};

#[tokio::test]
async fn test_exhausted_retries_fail_the_run() {
    let h = Harness::new(vec![timeout(), timeout(), timeout()]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry", 3).unwrap();

    let report = orch.drive(&id).await.unwrap();
    assert_eq!(report.stage, Stage::Failed);
    assert_eq!(h.model.calls(), 3);

    let status = orch.status(&id).unwrap();
    match status.run.failure_reason() {
        Some(FailureReason::GenerationExhausted { reason, error }) => {
            assert_eq!(*reason, ExhaustionReason::AttemptsExhausted);
            assert!(error.contains("timed out"), "error: {}", error)
        }
        other => panic!("unexpected failure reason: {:?}", other),
    }
    assert_eq!(
        status.attempts[0].exhaustion,
        Some(ExhaustionReason::AttemptsExhausted)
    );
    assert_eq!(status.attempts.len(), 1);
    assert_eq!(status.attempts[0].outcome, AttemptOutcome::GenerationFailed);
    assert!(status.attempts[0].artifact.is_none());
    assert!(status.pending_review.is_none());
    assert!(orch.gate().list().unwrap().is_empty());
}

#[tokio::test]
async fn test_transient_failures_are_absorbed() {
    let h = Harness::new(vec![
        timeout(),
        Err(ProviderError::ServerError {
            status: 503,
            message: "overloaded".to_string(),
        }),
        ok(),
    ]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry", 3).unwrap();

    let report = orch.drive(&id).await.unwrap();
    assert_eq!(report.stage, Stage::AwaitingReview);
    assert_eq!(h.model.calls(), 3);
    let status = orch.status(&id).unwrap();
    assert_eq!(status.attempts.len(), 1);
    assert_eq!(
        status.attempts[0].artifact.as_ref().unwrap().content,
        "pub fn retry() {}"
    );
}

#[tokio::test]
async fn test_malformed_output_fails_without_retry() {
    let h = Harness::new(vec![Ok("Sure! Here is the code you asked for.".to_string())]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry", 3).unwrap();

    let report = orch.drive(&id).await.unwrap();
    assert_eq!(report.stage, Stage::Failed);
    assert_eq!(h.model.calls(), 1);
    let status = orch.status(&id).unwrap();
    assert!(matches!(
        status.run.failure_reason(),
        Some(FailureReason::GenerationExhausted {
            reason: ExhaustionReason::NonRetryable,
            ..
        })
    ));
    assert_eq!(
        status.attempts[0].exhaustion,
        Some(ExhaustionReason::NonRetryable)
    );
}

#[tokio::test]
async fn test_unavailable_context_still_generates() {
    let h = Harness::with_unavailable_context(vec![ok()]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry", 3).unwrap();

    let report = orch.drive(&id).await.unwrap();
    assert_eq!(report.stage, Stage::AwaitingReview);
    assert_eq!(h.model.calls(), 1);

    let attempt = &orch.status(&id).unwrap().attempts[0];
    assert_eq!(attempt.snapshot.fragment_count, 0);
    assert!(attempt
        .warnings
        .iter()
        .any(|w| w.contains("context unavailable")));
}
