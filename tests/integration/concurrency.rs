use super::support::{ok, Harness, ScriptedModel, WAIT};
use std::sync::Arc;
use tokio::sync::Notify;
use walk::pipeline::{AdvanceOutcome, Stage};

#[tokio::test]
async fn test_concurrent_advances_generate_once() {
    let gate = Arc::new(Notify::new());
    let h = Harness::with_model(ScriptedModel::gated(vec![ok(), ok()], gate.clone()));
    let orch = &h.orchestrator;
    let id = orch.submit("add retry", 3).unwrap();
    orch.advance(&id).await.unwrap();

    let opener = async {
        while h.model.calls() == 0 {
            tokio::task::yield_now().await;
        }
        // give the second advance a chance to queue behind the lock
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();
    };
    let (first, second, ()) = tokio::time::timeout(WAIT, async {
        tokio::join!(orch.advance(&id), orch.advance(&id), opener)
    })
    .await
    .unwrap();

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(h.model.calls(), 1);
    assert_eq!(first.stage, Stage::AwaitingReview);
    assert_eq!(second.outcome, AdvanceOutcome::AwaitingDecision);
    assert_eq!(orch.status(&id).unwrap().attempts.len(), 1);
}

#[tokio::test]
async fn test_drive_all_settles_independent_runs() {
    let h = Harness::new(vec![ok(), ok(), ok()]);
    let orch = &h.orchestrator;
    let ids: Vec<_> = ["add retry", "add backoff", "add jitter"]
        .iter()
        .map(|task| orch.submit(task, 3).unwrap())
        .collect();

    let results = orch.drive_all(&ids).await;
    assert_eq!(results.len(), 3);
    for ((id, result), expected) in results.into_iter().zip(&ids) {
        assert_eq!(&id, expected);
        assert_eq!(result.unwrap().stage, Stage::AwaitingReview);
        assert_eq!(orch.status(&id).unwrap().attempts.len(), 1);
    }
    assert_eq!(h.model.calls(), 3);
    assert_eq!(orch.gate().list().unwrap().len(), 3);
}
