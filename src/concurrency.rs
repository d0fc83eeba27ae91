//! Per-run mutual exclusion.
//!
//! Every run mutation goes through the lock for that run id. Locks are async so a
//! holder may await the model call; they are never held across human review.

use crate::types::RunId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub type RunGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct RunLockManager {
    locks: Mutex<HashMap<RunId, Arc<AsyncMutex<()>>>>,
}

impl RunLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock for a run.
    pub fn get_lock(&self, run_id: &RunId) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(run_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn lock(&self, run_id: &RunId) -> RunGuard {
        self.get_lock(run_id).lock_owned().await
    }

    /// `None` when another task currently holds the run.
    pub fn try_lock(&self, run_id: &RunId) -> Option<RunGuard> {
        self.get_lock(run_id).try_lock_owned().ok()
    }

    /// Forget the lock of a run nobody is holding or waiting on.
    pub fn release(&self, run_id: &RunId) {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(run_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(run_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
