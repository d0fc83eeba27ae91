use super::support::{ok, Harness};
use walk::error::PipelineError;
use walk::pipeline::{
    AdvanceOutcome, AttemptOutcome, FailureReason, FeedbackDecision, Stage, TerminalResult,
};

#[tokio::test]
async fn test_approve_integrates_first_attempt() {
    let h = Harness::new(vec![ok()]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry to the http client", 3).unwrap();

    let report = orch.drive(&id).await.unwrap();
    assert_eq!(report.stage, Stage::AwaitingReview);
    assert_eq!(report.outcome, AdvanceOutcome::AwaitingDecision);

    let status = orch.status(&id).unwrap();
    assert_eq!(status.attempts.len(), 1);
    assert_eq!(status.attempts[0].outcome, AttemptOutcome::Pending);
    assert_eq!(status.pending_review.as_ref().unwrap().attempt_seq, 1);

    orch.resolve(&id, FeedbackDecision::Approve).await.unwrap();
    let report = orch.advance(&id).await.unwrap();
    assert_eq!(report.stage, Stage::Integrated);

    let status = orch.status(&id).unwrap();
    assert_eq!(
        status.run.result,
        Some(TerminalResult::Integrated { attempt_seq: 1 })
    );
    assert_eq!(status.attempts[0].outcome, AttemptOutcome::Approved);
    assert!(status.pending_review.is_none());
    assert!(status.run.archived_at_ms.is_some());
    assert_eq!(h.model.calls(), 1);
}

#[tokio::test]
async fn test_request_changes_feeds_comments_into_next_cycle() {
    let h = Harness::new(vec![ok(), ok()]);
    h.publish(&[
        ("src/client.rs", "pub fn get() { /* http client */ }"),
        ("tests/client.rs", "#[test] fn get_works() {}"),
    ]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry to the http client", 3).unwrap();
    orch.drive(&id).await.unwrap();

    orch.resolve(
        &id,
        FeedbackDecision::RequestChanges {
            comments: "missing tests".to_string(),
        },
    )
    .await
    .unwrap();
    let report = orch.advance(&id).await.unwrap();
    assert_eq!(report.stage, Stage::ContextAssembly);
    assert_eq!(report.iteration, 2);

    let report = orch.drive(&id).await.unwrap();
    assert_eq!(report.stage, Stage::AwaitingReview);
    assert_eq!(h.model.calls(), 2);
    assert!(!h.model.request_text(0).contains("missing tests"));
    assert!(h.model.request_text(1).contains("missing tests"));

    let status = orch.status(&id).unwrap();
    assert_eq!(status.attempts.len(), 2);
    assert_eq!(status.attempts[0].outcome, AttemptOutcome::ChangesRequested);
    assert_eq!(status.attempts[1].iteration, 2);
    // the amended query pulled the test file into context
    assert!(status.attempts[1].snapshot.fragment_count >= 1);

    orch.resolve(&id, FeedbackDecision::Approve).await.unwrap();
    orch.advance(&id).await.unwrap();
    let run = orch.status(&id).unwrap().run;
    assert_eq!(run.result, Some(TerminalResult::Integrated { attempt_seq: 2 }));
    assert_eq!(run.feedback, vec!["missing tests".to_string()]);
}

#[tokio::test]
async fn test_request_changes_at_iteration_limit_fails() {
    let h = Harness::new(vec![ok()]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry", 1).unwrap();
    orch.drive(&id).await.unwrap();

    orch.resolve(
        &id,
        FeedbackDecision::RequestChanges {
            comments: "again".to_string(),
        },
    )
    .await
    .unwrap();
    let report = orch.advance(&id).await.unwrap();
    assert_eq!(report.stage, Stage::Failed);

    let status = orch.status(&id).unwrap();
    assert_eq!(
        status.run.failure_reason(),
        Some(&FailureReason::IterationLimit)
    );
    assert_eq!(status.attempts[0].outcome, AttemptOutcome::ChangesRequested);
    assert_eq!(h.model.calls(), 1);
}

#[tokio::test]
async fn test_consecutive_change_requests_hit_the_limit() {
    let h = Harness::new(vec![ok(), ok(), ok()]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry", 3).unwrap();

    for round in 1..=3u32 {
        let report = orch.drive(&id).await.unwrap();
        assert_eq!(report.stage, Stage::AwaitingReview);
        assert_eq!(report.iteration, round);
        orch.resolve(
            &id,
            FeedbackDecision::RequestChanges {
                comments: format!("round {} comments", round),
            },
        )
        .await
        .unwrap();
        orch.advance(&id).await.unwrap();
    }

    let status = orch.status(&id).unwrap();
    assert_eq!(status.run.stage, Stage::Failed);
    assert_eq!(status.run.iteration, 3);
    assert_eq!(
        status.run.failure_reason(),
        Some(&FailureReason::IterationLimit)
    );
    assert_eq!(status.attempts.len(), 3);
    assert!(status
        .attempts
        .iter()
        .all(|a| a.outcome == AttemptOutcome::ChangesRequested));
    assert_eq!(h.model.calls(), 3);
    // every loop-back carried the earlier comments forward
    assert!(h.model.request_text(2).contains("round 1 comments"));
    assert!(h.model.request_text(2).contains("round 2 comments"));
}

#[tokio::test]
async fn test_reject_fails_with_reason() {
    let h = Harness::new(vec![ok()]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry", 3).unwrap();
    orch.drive(&id).await.unwrap();

    orch.resolve(
        &id,
        FeedbackDecision::Reject {
            reason: "wrong approach".to_string(),
        },
    )
    .await
    .unwrap();
    orch.advance(&id).await.unwrap();

    let status = orch.status(&id).unwrap();
    assert_eq!(
        status.run.failure_reason(),
        Some(&FailureReason::Rejected("wrong approach".to_string()))
    );
    assert_eq!(status.attempts[0].outcome, AttemptOutcome::Rejected);
}

#[tokio::test]
async fn test_terminal_runs_ignore_advance() {
    let h = Harness::new(vec![ok()]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry", 3).unwrap();
    orch.drive(&id).await.unwrap();
    orch.resolve(&id, FeedbackDecision::Approve).await.unwrap();
    orch.advance(&id).await.unwrap();

    let before = orch.status(&id).unwrap().run;
    let report = orch.advance(&id).await.unwrap();
    assert_eq!(report.outcome, AdvanceOutcome::AlreadyTerminal);
    assert_eq!(orch.status(&id).unwrap().run, before);
    assert_eq!(h.model.calls(), 1);

    let err = orch
        .resolve(&id, FeedbackDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidStateForDecision { .. }));
    assert_eq!(err.status_code().exit_code(), 3);
}

#[tokio::test]
async fn test_second_decision_is_rejected_until_applied() {
    let h = Harness::new(vec![ok()]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry", 3).unwrap();
    orch.drive(&id).await.unwrap();

    orch.resolve(&id, FeedbackDecision::Approve).await.unwrap();
    let err = orch
        .resolve(
            &id,
            FeedbackDecision::Reject {
                reason: "changed my mind".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.status_code().exit_code(), 3);

    orch.advance(&id).await.unwrap();
    assert_eq!(orch.status(&id).unwrap().run.stage, Stage::Integrated);
}

#[tokio::test]
async fn test_invalid_input_is_a_validation_error() {
    let h = Harness::new(vec![]);
    let orch = &h.orchestrator;
    let err = orch.submit("   ", 3).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTask(_)));
    assert_eq!(err.status_code().exit_code(), 4);

    let id = orch.submit("add retry", 3).unwrap();
    let err = orch
        .resolve(
            &id,
            FeedbackDecision::RequestChanges {
                comments: " ".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidDecision(_)));
}

#[tokio::test]
async fn test_history_records_every_transition() {
    let h = Harness::new(vec![ok()]);
    let orch = &h.orchestrator;
    let id = orch.submit("add retry", 3).unwrap();
    orch.drive(&id).await.unwrap();
    orch.resolve(&id, FeedbackDecision::Approve).await.unwrap();
    orch.advance(&id).await.unwrap();

    let stages: Vec<(Stage, Stage)> = orch
        .status(&id)
        .unwrap()
        .run
        .history
        .iter()
        .map(|t| (t.from, t.to))
        .collect();
    assert_eq!(
        stages,
        vec![
            (Stage::ContextAssembly, Stage::Generating),
            (Stage::Generating, Stage::AwaitingReview),
            (Stage::AwaitingReview, Stage::Integrated),
        ]
    );
}

#[tokio::test]
async fn test_identical_tasks_share_a_snapshot() {
    let h = Harness::new(vec![ok(), ok()]);
    h.publish(&[("src/retry.rs", "fn retry() {}"), ("README.md", "retry docs")]);
    let orch = &h.orchestrator;
    let a = orch.submit("implement retry", 3).unwrap();
    let b = orch.submit("implement retry", 3).unwrap();
    orch.drive(&a).await.unwrap();
    orch.drive(&b).await.unwrap();

    let snap_a = orch.status(&a).unwrap().attempts[0].snapshot.clone();
    let snap_b = orch.status(&b).unwrap().attempts[0].snapshot.clone();
    assert_eq!(snap_a, snap_b);
    assert_eq!(snap_a.fragment_count, 2);
    assert_eq!(h.model.request_text(0), h.model.request_text(1));
}

#[tokio::test]
async fn test_list_filters_by_stage() {
    let h = Harness::new(vec![ok()]);
    let orch = &h.orchestrator;
    let waiting = orch.submit("first", 3).unwrap();
    let fresh = orch.submit("second", 3).unwrap();
    orch.drive(&waiting).await.unwrap();

    let in_review: Vec<_> = orch
        .list(Some(Stage::AwaitingReview))
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(in_review, vec![waiting]);
    let assembling: Vec<_> = orch
        .list(Some(Stage::ContextAssembly))
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(assembling, vec![fresh]);
    assert_eq!(orch.list(None).unwrap().len(), 2);
}
