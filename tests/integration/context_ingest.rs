use std::fs;
use tempfile::TempDir;
use walk::context::{ContentType, ContextStore, Ingestor, SledContextStore, SnapshotBudget};

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("target/debug")).unwrap();
    fs::write(
        root.join("src/retry.rs"),
        "pub fn retry_with_backoff() {\n    // exponential backoff\n}\n",
    )
    .unwrap();
    fs::write(root.join("src/client.rs"), "pub fn send() {}\n").unwrap();
    fs::write(root.join("README.md"), "A client with retry and backoff.\n").unwrap();
    fs::write(root.join("logo.png"), [0x89u8, 0x50, 0x4e, 0x47, 0x00, 0x01]).unwrap();
    fs::write(root.join("target/debug/build.rs"), "fn retry() {}").unwrap();
    dir
}

#[test]
fn test_ingest_publishes_text_files_as_a_version() {
    let ws = workspace();
    let db_dir = TempDir::new().unwrap();
    let store = SledContextStore::open(db_dir.path()).unwrap();

    let report = Ingestor::default().ingest(ws.path(), &store).unwrap();
    assert_eq!(report.version, 1);
    assert_eq!(report.files, 3);
    assert_eq!(report.skipped, vec!["logo.png".to_string()]);
    assert_eq!(store.current_version().unwrap(), 1);

    let sources: Vec<String> = store
        .fragments_at(1)
        .unwrap()
        .into_iter()
        .map(|f| f.source)
        .collect();
    assert!(sources.iter().all(|s| !s.starts_with("target")));
    assert!(sources.contains(&"src/retry.rs".to_string()));
}

#[test]
fn test_queries_are_deterministic_and_pinned_to_versions() {
    let ws = workspace();
    let db_dir = TempDir::new().unwrap();
    let store = SledContextStore::open(db_dir.path()).unwrap();
    let ingestor = Ingestor::default();
    ingestor.ingest(ws.path(), &store).unwrap();

    let first = store.query("retry with backoff", 1).unwrap();
    let second = store.query("retry with backoff", 1).unwrap();
    assert_eq!(first, second);
    assert!(first.verify());
    assert_eq!(first.fragments[0].fragment.source, "src/retry.rs");
    assert_eq!(store.snapshot(&first.id).unwrap(), first);

    // a new version leaves the old one queryable and unchanged
    fs::write(ws.path().join("src/retry.rs"), "pub fn unrelated() {}\n").unwrap();
    let report = ingestor.ingest(ws.path(), &store).unwrap();
    assert_eq!(report.version, 2);
    assert_eq!(store.query("retry with backoff", 1).unwrap(), first);
    assert_ne!(store.query("retry with backoff", 2).unwrap().id, first.id);
}

#[test]
fn test_removing_a_fragment_leaves_pinned_snapshots_intact() {
    let ws = workspace();
    let db_dir = TempDir::new().unwrap();
    let store = SledContextStore::open(db_dir.path()).unwrap();
    Ingestor::default().ingest(ws.path(), &store).unwrap();
    let pinned = store.query("retry with backoff", 1).unwrap();

    let code = store.list_fragments(1, Some(ContentType::Code)).unwrap();
    assert_eq!(code.len(), 2);
    assert!(code.iter().all(|f| f.content_type == ContentType::Code));

    let version = store.remove_fragment("src/retry.rs#0").unwrap();
    assert_eq!(version, 2);
    let remaining = store.list_fragments(2, None).unwrap();
    assert!(remaining.iter().all(|f| f.id != "src/retry.rs#0"));
    assert_eq!(remaining.len(), store.fragments_at(1).unwrap().len() - 1);

    assert_eq!(store.query("retry with backoff", 1).unwrap(), pinned);
    assert_eq!(store.snapshot(&pinned.id).unwrap(), pinned);
    let after = store.query("retry with backoff", 2).unwrap();
    assert!(after
        .fragments
        .iter()
        .all(|r| r.fragment.source != "src/retry.rs"));
}

#[test]
fn test_budget_bounds_snapshot_size() {
    let ws = workspace();
    let db_dir = TempDir::new().unwrap();
    let store = SledContextStore::open(db_dir.path())
        .unwrap()
        .with_budget(SnapshotBudget {
            max_fragments: 1,
            max_bytes: 4096,
        });
    Ingestor::default().ingest(ws.path(), &store).unwrap();

    let snapshot = store.query("client retry backoff", 1).unwrap();
    assert_eq!(snapshot.len(), 1);
}

#[test]
fn test_unknown_version_is_an_error() {
    let db_dir = TempDir::new().unwrap();
    let store = SledContextStore::open(db_dir.path()).unwrap();
    assert!(store.query("anything", 3).is_err());
    assert!(store.query("anything", 0).unwrap().is_empty());
}
