//! Property-based tests for snapshot determinism and budget bounds

use proptest::prelude::*;
use tempfile::TempDir;
use walk::context::{
    select_fragments, ContextSnapshot, ContextStore, Fragment, KeywordRanker, Query,
    SledContextStore, SnapshotBudget,
};

const VOCAB: &[&str] = &[
    "retry", "backoff", "client", "http", "cache", "parser", "token", "jitter", "queue",
    "worker", "config", "error",
];

fn word() -> impl Strategy<Value = String> {
    prop::sample::select(VOCAB).prop_map(str::to_string)
}

fn corpus() -> impl Strategy<Value = Vec<Fragment>> {
    prop::collection::vec(prop::collection::vec(word(), 1..20), 0..12).prop_map(|bodies| {
        bodies
            .into_iter()
            .enumerate()
            .map(|(i, words)| {
                Fragment::from_chunk(&format!("src/file{}.rs", i), 0, 1, words.join(" ")).unwrap()
            })
            .collect()
    })
}

fn query_text() -> impl Strategy<Value = String> {
    prop::collection::vec(word(), 1..5).prop_map(|words| words.join(" "))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn selection_respects_budget(
        fragments in corpus(),
        query in query_text(),
        max_fragments in 1usize..6,
        max_bytes in 1usize..400,
    ) {
        let budget = SnapshotBudget { max_fragments, max_bytes };
        let selected = select_fragments(&KeywordRanker::default(), &Query::new(&query), fragments, budget);

        prop_assert!(selected.len() <= max_fragments);
        let bytes: usize = selected.iter().map(|r| r.fragment.byte_len()).sum();
        prop_assert!(bytes <= max_bytes);
        prop_assert!(selected.iter().all(|r| r.score > 0));
        prop_assert!(selected.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn selection_ignores_input_order(fragments in corpus(), query in query_text()) {
        let q = Query::new(&query);
        let ranker = KeywordRanker::default();
        let budget = SnapshotBudget::default();
        let mut reversed = fragments.clone();
        reversed.reverse();

        let forward = ContextSnapshot::assemble(&query, 1, select_fragments(&ranker, &q, fragments, budget));
        let backward = ContextSnapshot::assemble(&query, 1, select_fragments(&ranker, &q, reversed, budget));
        prop_assert_eq!(forward, backward);
    }
}

/// Repeated queries against one store version yield byte-identical snapshots.
#[test]
fn test_store_query_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(16));

    runner
        .run(&(corpus(), query_text()), |(fragments, query)| {
            let dir = TempDir::new().unwrap();
            let store = SledContextStore::open(dir.path()).unwrap();
            let version = store.publish(fragments, "proptest").unwrap();

            let first = store.query(&query, version).unwrap();
            let second = store.query(&query, version).unwrap();
            assert_eq!(
                serde_json::to_vec(&first).unwrap(),
                serde_json::to_vec(&second).unwrap()
            );
            assert!(first.verify());
            assert_eq!(store.snapshot(&first.id).unwrap(), first);
            Ok(())
        })
        .unwrap();
}
