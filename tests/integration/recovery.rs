use super::support::{ok, Harness};
use walk::pipeline::{AttemptOutcome, FeedbackDecision, Stage, TerminalResult};

#[tokio::test]
async fn test_awaiting_review_survives_restart() {
    let h = Harness::new(vec![ok()]);
    let id = h.orchestrator.submit("add retry", 3).unwrap();
    h.orchestrator.drive(&id).await.unwrap();

    let h = h.restart(vec![]);
    let orch = &h.orchestrator;
    let report = orch.recover().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.awaiting_review, vec![id.clone()]);
    assert_eq!(orch.gate().pending(&id).unwrap().unwrap().attempt_seq, 1);

    orch.resolve(&id, FeedbackDecision::Approve).await.unwrap();
    orch.advance(&id).await.unwrap();
    assert_eq!(
        orch.status(&id).unwrap().run.result,
        Some(TerminalResult::Integrated { attempt_seq: 1 })
    );
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn test_delivered_decision_survives_restart() {
    let h = Harness::new(vec![ok()]);
    let id = h.orchestrator.submit("add retry", 3).unwrap();
    h.orchestrator.drive(&id).await.unwrap();
    h.orchestrator
        .resolve(
            &id,
            FeedbackDecision::Reject {
                reason: "out of scope".to_string(),
            },
        )
        .await
        .unwrap();

    let h = h.restart(vec![]);
    let orch = &h.orchestrator;
    orch.recover().await.unwrap();
    orch.advance(&id).await.unwrap();

    let status = orch.status(&id).unwrap();
    assert_eq!(status.run.stage, Stage::Failed);
    assert_eq!(status.attempts[0].outcome, AttemptOutcome::Rejected);
    assert!(status.pending_review.is_none());
}

#[tokio::test]
async fn test_interrupted_cycle_resumes_from_current_stage() {
    let h = Harness::new(vec![]);
    h.publish(&[("src/retry.rs", "fn retry() {}")]);
    let id = h.orchestrator.submit("implement retry", 3).unwrap();
    h.orchestrator.advance(&id).await.unwrap();
    let pinned = h.orchestrator.status(&id).unwrap().run.cycle.unwrap();

    let h = h.restart(vec![ok()]);
    // publishing after the pin does not change the cycle's snapshot
    h.publish(&[("src/other.rs", "fn retry_later() {}")]);
    let orch = &h.orchestrator;
    let report = orch.recover().await.unwrap();
    assert_eq!(report.resumable, vec![id.clone()]);

    let report = orch.drive(&id).await.unwrap();
    assert_eq!(report.stage, Stage::AwaitingReview);
    assert_eq!(h.model.calls(), 1);
    let attempt = &orch.status(&id).unwrap().attempts[0];
    assert_eq!(attempt.snapshot, pinned.snapshot);
    assert_eq!(attempt.snapshot.store_version, 1);
}
