//! Sled-backed pipeline persistence.

use crate::error::StorageError;
use crate::feedback::PendingReview;
use crate::pipeline::{Attempt, AttemptOutcome, Run, Stage};
use crate::store::{ReviewStore, RunStore};
use crate::types::{now_millis, RunId};
use sled::{Db, Tree};
use std::io;
use std::path::Path;
use std::sync::Arc;

const TREE_RUNS: &str = "runs";
const TREE_RUNS_BY_STAGE: &str = "runs_by_stage";
const TREE_ATTEMPTS: &str = "attempts";
const TREE_PENDING_REVIEWS: &str = "pending_reviews";
const TREE_CANCELLATIONS: &str = "cancellations";
const ATTEMPT_KEY_PAD: usize = 10;

#[derive(Clone)]
pub struct SledPipelineStore {
    db: Db,
    runs: Tree,
    runs_by_stage: Tree,
    attempts: Tree,
    reviews: Tree,
    cancellations: Tree,
}

impl SledPipelineStore {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        Ok(Self {
            runs: db.open_tree(TREE_RUNS).map_err(to_storage_io)?,
            runs_by_stage: db.open_tree(TREE_RUNS_BY_STAGE).map_err(to_storage_io)?,
            attempts: db.open_tree(TREE_ATTEMPTS).map_err(to_storage_io)?,
            reviews: db.open_tree(TREE_PENDING_REVIEWS).map_err(to_storage_io)?,
            cancellations: db.open_tree(TREE_CANCELLATIONS).map_err(to_storage_io)?,
            db,
        })
    }

    /// Open (or create) a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(io::Error::new(
                io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Self::new(db)
    }

    pub fn shared(db: Db) -> Result<Arc<Self>, StorageError> {
        Ok(Arc::new(Self::new(db)?))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }

    fn index_stage(&self, run: &Run) -> Result<(), StorageError> {
        self.runs_by_stage
            .insert(encode_stage_key(run.stage, &run.id), run.id.as_str().as_bytes())
            .map_err(to_storage_io)?;
        Ok(())
    }

    fn write_record(&self, run: &Run) -> Result<(), StorageError> {
        let value = serde_json::to_vec(run).map_err(to_storage_data)?;
        self.runs
            .insert(run.id.as_str().as_bytes(), value)
            .map_err(to_storage_io)?;
        Ok(())
    }

    fn unindex_stage(&self, run_id: &RunId, stage: Stage) -> Result<(), StorageError> {
        self.runs_by_stage
            .remove(encode_stage_key(stage, run_id))
            .map_err(to_storage_io)?;
        Ok(())
    }

    fn read_runs<I>(&self, ids: I) -> Result<Vec<Run>, StorageError>
    where
        I: IntoIterator<Item = sled::IVec>,
    {
        let mut out = Vec::new();
        for id in ids {
            if let Some(raw) = self.runs.get(&id).map_err(to_storage_io)? {
                out.push(serde_json::from_slice::<Run>(&raw).map_err(to_storage_data)?);
            }
        }
        out.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }
}

impl RunStore for SledPipelineStore {
    /// Index first, record second, stale index entry last: whichever write a crash
    /// interrupts, the stage in the stored record is always indexed.
    fn upsert_run(&self, run: &Run) -> Result<(), StorageError> {
        let previous = self.get_run(&run.id)?.map(|old| old.stage);
        self.index_stage(run)?;
        self.write_record(run)?;
        if let Some(old) = previous.filter(|old| *old != run.stage) {
            self.unindex_stage(&run.id, old)?;
        }
        self.flush()
    }

    fn get_run(&self, run_id: &RunId) -> Result<Option<Run>, StorageError> {
        let Some(raw) = self
            .runs
            .get(run_id.as_str().as_bytes())
            .map_err(to_storage_io)?
        else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&raw).map_err(to_storage_data)?;
        Ok(Some(parsed))
    }

    fn list_runs(&self) -> Result<Vec<Run>, StorageError> {
        let mut ids = Vec::new();
        for entry in self.runs.iter() {
            let (key, _) = entry.map_err(to_storage_io)?;
            ids.push(key);
        }
        self.read_runs(ids)
    }

    fn list_runs_by_stage(&self, stage: Stage) -> Result<Vec<Run>, StorageError> {
        let prefix = format!("{}:", stage.as_str());
        let mut ids = Vec::new();
        for entry in self.runs_by_stage.scan_prefix(prefix.as_bytes()) {
            let (_, id) = entry.map_err(to_storage_io)?;
            ids.push(id);
        }
        // an interrupted upsert can leave a stale entry behind; trust the record
        Ok(self
            .read_runs(ids)?
            .into_iter()
            .filter(|run| run.stage == stage)
            .collect())
    }

    fn append_attempt(&self, run_id: &RunId, attempt: &Attempt) -> Result<(), StorageError> {
        let key = encode_attempt_key(run_id, attempt.seq);
        let value = serde_json::to_vec(attempt).map_err(to_storage_data)?;
        let swapped = self
            .attempts
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value))
            .map_err(to_storage_io)?;
        if swapped.is_err() {
            return Err(StorageError::AttemptExists {
                run_id: run_id.clone(),
                seq: attempt.seq,
            });
        }
        self.flush()
    }

    fn list_attempts(&self, run_id: &RunId) -> Result<Vec<Attempt>, StorageError> {
        let prefix = format!("{}:", run_id);
        let mut out = Vec::new();
        for entry in self.attempts.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry.map_err(to_storage_io)?;
            out.push(serde_json::from_slice::<Attempt>(&value).map_err(to_storage_data)?);
        }
        out.sort_by_key(|a| a.seq);
        Ok(out)
    }

    fn get_attempt(&self, run_id: &RunId, seq: u32) -> Result<Option<Attempt>, StorageError> {
        let key = encode_attempt_key(run_id, seq);
        let Some(raw) = self.attempts.get(key.as_bytes()).map_err(to_storage_io)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw).map_err(to_storage_data)?))
    }

    fn seal_attempt(
        &self,
        run_id: &RunId,
        seq: u32,
        outcome: AttemptOutcome,
    ) -> Result<Attempt, StorageError> {
        let mut attempt =
            self.get_attempt(run_id, seq)?
                .ok_or_else(|| StorageError::AttemptNotFound {
                    run_id: run_id.clone(),
                    seq,
                })?;

        if attempt.outcome == outcome {
            return Ok(attempt);
        }
        if attempt.outcome != AttemptOutcome::Pending {
            return Err(StorageError::AttemptSealed {
                run_id: run_id.clone(),
                seq,
                outcome: attempt.outcome.to_string(),
            });
        }

        attempt.outcome = outcome;
        attempt.resolved_at_ms = Some(now_millis());
        let value = serde_json::to_vec(&attempt).map_err(to_storage_data)?;
        self.attempts
            .insert(encode_attempt_key(run_id, seq).as_bytes(), value)
            .map_err(to_storage_io)?;
        self.flush()?;
        Ok(attempt)
    }

    fn request_cancellation(&self, run_id: &RunId) -> Result<(), StorageError> {
        let value = serde_json::to_vec(&now_millis()).map_err(to_storage_data)?;
        self.cancellations
            .insert(run_id.as_str().as_bytes(), value)
            .map_err(to_storage_io)?;
        self.flush()
    }

    fn cancellation_requested(&self, run_id: &RunId) -> Result<bool, StorageError> {
        self.cancellations
            .contains_key(run_id.as_str().as_bytes())
            .map_err(to_storage_io)
    }

    fn clear_cancellation(&self, run_id: &RunId) -> Result<(), StorageError> {
        self.cancellations
            .remove(run_id.as_str().as_bytes())
            .map_err(to_storage_io)?;
        Ok(())
    }

    fn list_cancellations(&self) -> Result<Vec<RunId>, StorageError> {
        let mut out = Vec::new();
        for entry in self.cancellations.iter() {
            let (key, _) = entry.map_err(to_storage_io)?;
            out.push(decode_run_id(&key)?);
        }
        Ok(out)
    }
}

impl ReviewStore for SledPipelineStore {
    fn put_review(&self, review: &PendingReview) -> Result<(), StorageError> {
        let value = serde_json::to_vec(review).map_err(to_storage_data)?;
        self.reviews
            .insert(review.run_id.as_str().as_bytes(), value)
            .map_err(to_storage_io)?;
        self.flush()
    }

    fn get_review(&self, run_id: &RunId) -> Result<Option<PendingReview>, StorageError> {
        let Some(raw) = self
            .reviews
            .get(run_id.as_str().as_bytes())
            .map_err(to_storage_io)?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw).map_err(to_storage_data)?))
    }

    fn remove_review(&self, run_id: &RunId) -> Result<bool, StorageError> {
        let removed = self
            .reviews
            .remove(run_id.as_str().as_bytes())
            .map_err(to_storage_io)?;
        Ok(removed.is_some())
    }

    fn list_reviews(&self) -> Result<Vec<PendingReview>, StorageError> {
        let mut out = Vec::new();
        for entry in self.reviews.iter() {
            let (_, value) = entry.map_err(to_storage_io)?;
            out.push(serde_json::from_slice::<PendingReview>(&value).map_err(to_storage_data)?);
        }
        out.sort_by_key(|r| r.requested_at_ms);
        Ok(out)
    }
}

fn encode_stage_key(stage: Stage, run_id: &RunId) -> String {
    format!("{}:{}", stage.as_str(), run_id)
}

fn encode_attempt_key(run_id: &RunId, seq: u32) -> String {
    format!("{}:{:0width$}", run_id, seq, width = ATTEMPT_KEY_PAD)
}

fn decode_run_id(key: &[u8]) -> Result<RunId, StorageError> {
    let text = std::str::from_utf8(key)
        .map_err(|e| StorageError::InvalidKey(format!("non-utf8 run key: {}", e)))?;
    text.parse().map_err(StorageError::InvalidKey)
}

fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::Other, err.to_string()))
}

fn to_storage_data(err: serde_json::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}
