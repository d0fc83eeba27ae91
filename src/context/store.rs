//! Versioned, sled-backed context corpus.

use super::fragment::{ContentType, Fragment};
use super::ranking::{select_fragments, KeywordRanker, Query, RelevanceRanker, SnapshotBudget};
use super::snapshot::ContextSnapshot;
use crate::error::ContextError;
use crate::types::{now_millis, SnapshotId, StoreVersion};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const TREE_FRAGMENTS: &str = "ctx_fragments";
const TREE_VERSIONS: &str = "ctx_versions";
const TREE_SNAPSHOTS: &str = "ctx_snapshots";
const VERSION_KEY_PAD: usize = 20;

/// Read side of the context corpus, as seen by the orchestrator.
pub trait ContextStore: Send + Sync {
    /// Latest published version; 0 when nothing has been published.
    fn current_version(&self) -> Result<StoreVersion, ContextError>;

    /// Ranked, budgeted snapshot for `task_description` at `store_version`.
    /// Deterministic for fixed inputs.
    fn query(
        &self,
        task_description: &str,
        store_version: StoreVersion,
    ) -> Result<ContextSnapshot, ContextError>;

    /// A snapshot previously returned by [`ContextStore::query`].
    fn snapshot(&self, id: &SnapshotId) -> Result<ContextSnapshot, ContextError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: StoreVersion,
    pub fragment_count: usize,
    pub total_bytes: u64,
    pub source: String,
    pub published_at_ms: u64,
}

#[derive(Clone)]
pub struct SledContextStore {
    db: Db,
    fragments: Tree,
    versions: Tree,
    snapshots: Tree,
    ranker: Arc<dyn RelevanceRanker>,
    budget: SnapshotBudget,
}

impl SledContextStore {
    pub fn new(db: Db) -> Result<Self, ContextError> {
        let fragments = db.open_tree(TREE_FRAGMENTS).map_err(unavailable)?;
        let versions = db.open_tree(TREE_VERSIONS).map_err(unavailable)?;
        let snapshots = db.open_tree(TREE_SNAPSHOTS).map_err(unavailable)?;
        Ok(Self {
            db,
            fragments,
            versions,
            snapshots,
            ranker: Arc::new(KeywordRanker::default()),
            budget: SnapshotBudget::default(),
        })
    }

    pub fn open(path: &Path) -> Result<Self, ContextError> {
        let db = sled::open(path).map_err(unavailable)?;
        Self::new(db)
    }

    pub fn with_ranker(mut self, ranker: Arc<dyn RelevanceRanker>) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn with_budget(mut self, budget: SnapshotBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn budget(&self) -> SnapshotBudget {
        self.budget
    }

    /// Publish `fragments` as a new immutable version and return it.
    ///
    /// Fragments are written before the version record, so a crash mid-publish
    /// leaves the new version invisible.
    pub fn publish(
        &self,
        fragments: Vec<Fragment>,
        source: &str,
    ) -> Result<StoreVersion, ContextError> {
        let version = self.current_version()? + 1;
        let mut batch = sled::Batch::default();
        let mut seen = std::collections::BTreeSet::new();
        let mut total_bytes = 0u64;
        for fragment in &fragments {
            if !seen.insert(fragment.id.as_str()) {
                return Err(ContextError::InvalidFragment(format!(
                    "duplicate fragment id {}",
                    fragment.id
                )));
            }
            total_bytes += fragment.byte_len() as u64;
            let value = serde_json::to_vec(fragment).map_err(invalid)?;
            batch.insert(encode_fragment_key(version, &fragment.id).as_bytes(), value);
        }
        self.fragments.apply_batch(batch).map_err(unavailable)?;

        let record = VersionRecord {
            version,
            fragment_count: fragments.len(),
            total_bytes,
            source: source.to_string(),
            published_at_ms: now_millis(),
        };
        let value = serde_json::to_vec(&record).map_err(invalid)?;
        self.versions
            .insert(version.to_be_bytes(), value)
            .map_err(unavailable)?;
        self.db.flush().map_err(unavailable)?;

        info!(
            version,
            fragments = record.fragment_count,
            bytes = total_bytes,
            "Published context version"
        );
        Ok(version)
    }

    pub fn versions(&self) -> Result<Vec<VersionRecord>, ContextError> {
        let mut out = Vec::new();
        for entry in self.versions.iter() {
            let (_, value) = entry.map_err(unavailable)?;
            out.push(serde_json::from_slice(&value).map_err(invalid)?);
        }
        Ok(out)
    }

    /// All fragments of `version`, ordered by fragment id.
    pub fn fragments_at(&self, version: StoreVersion) -> Result<Vec<Fragment>, ContextError> {
        if version == 0 {
            return Ok(Vec::new());
        }
        if !self
            .versions
            .contains_key(version.to_be_bytes())
            .map_err(unavailable)?
        {
            return Err(ContextError::UnknownVersion(version));
        }
        let prefix = format!("{:0pad$}:", version, pad = VERSION_KEY_PAD);
        let mut out = Vec::new();
        for entry in self.fragments.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry.map_err(unavailable)?;
            out.push(serde_json::from_slice(&value).map_err(invalid)?);
        }
        Ok(out)
    }

    /// Fragments of `version`, optionally narrowed to one content type.
    pub fn list_fragments(
        &self,
        version: StoreVersion,
        content_type: Option<ContentType>,
    ) -> Result<Vec<Fragment>, ContextError> {
        let mut fragments = self.fragments_at(version)?;
        if let Some(kind) = content_type {
            fragments.retain(|f| f.content_type == kind);
        }
        Ok(fragments)
    }

    /// Publish the current version minus `fragment_id` as a new version.
    /// Earlier versions keep the fragment.
    pub fn remove_fragment(&self, fragment_id: &str) -> Result<StoreVersion, ContextError> {
        let current = self.current_version()?;
        let mut fragments = self.fragments_at(current)?;
        let before = fragments.len();
        fragments.retain(|f| f.id != fragment_id);
        if fragments.len() == before {
            return Err(ContextError::FragmentNotFound(fragment_id.to_string()));
        }
        let version = self.publish(fragments, &format!("remove {}", fragment_id))?;
        debug!(fragment_id, version, "Removed context fragment");
        Ok(version)
    }
}

impl ContextStore for SledContextStore {
    fn current_version(&self) -> Result<StoreVersion, ContextError> {
        match self.versions.last().map_err(unavailable)? {
            Some((key, _)) => {
                let bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                    ContextError::StoreUnavailable("corrupted version key".to_string())
                })?;
                Ok(StoreVersion::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    fn query(
        &self,
        task_description: &str,
        store_version: StoreVersion,
    ) -> Result<ContextSnapshot, ContextError> {
        let fragments = self.fragments_at(store_version)?;
        let candidates = fragments.len();
        let query = Query::new(task_description);
        let selected = select_fragments(self.ranker.as_ref(), &query, fragments, self.budget);
        let snapshot = ContextSnapshot::assemble(task_description, store_version, selected);

        // content-addressed: an existing entry already holds identical bytes
        let value = serde_json::to_vec(&snapshot).map_err(invalid)?;
        self.snapshots
            .compare_and_swap(snapshot.id.as_str().as_bytes(), None as Option<&[u8]>, Some(value))
            .map_err(unavailable)?
            .ok();

        debug!(
            store_version,
            candidates,
            selected = snapshot.len(),
            snapshot_id = %snapshot.id.short(),
            ranker = self.ranker.name(),
            "Assembled context snapshot"
        );
        Ok(snapshot)
    }

    fn snapshot(&self, id: &SnapshotId) -> Result<ContextSnapshot, ContextError> {
        let raw = self
            .snapshots
            .get(id.as_str().as_bytes())
            .map_err(unavailable)?
            .ok_or_else(|| ContextError::SnapshotNotFound(id.to_string()))?;
        serde_json::from_slice(&raw).map_err(invalid)
    }
}

fn encode_fragment_key(version: StoreVersion, fragment_id: &str) -> String {
    format!("{:0pad$}:{}", version, fragment_id, pad = VERSION_KEY_PAD)
}

fn unavailable(err: sled::Error) -> ContextError {
    ContextError::StoreUnavailable(err.to_string())
}

fn invalid(err: serde_json::Error) -> ContextError {
    ContextError::InvalidFragment(err.to_string())
}
