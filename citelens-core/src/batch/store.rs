//! Registry of batch jobs keyed by batch id.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::job::BatchJob;
use super::task::BatchId;

/// In-memory batch registry.
///
/// Jobs are created on submit and retained until removed. When more than
/// `capacity` jobs are held, the oldest finished ones are evicted; running
/// jobs are never evicted.
#[derive(Debug)]
pub struct BatchStore {
    capacity: usize,
    jobs: RwLock<HashMap<BatchId, Arc<BatchJob>>>,
}

impl BatchStore {
    /// Create an empty store retaining at most `capacity` finished jobs.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register `job`, evicting old finished jobs if over capacity.
    ///
    /// Returns the ids that were evicted.
    pub fn insert(&self, job: Arc<BatchJob>) -> Vec<BatchId> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.id(), job);

        let overflow = jobs.len().saturating_sub(self.capacity);
        if overflow == 0 {
            return Vec::new();
        }
        let mut finished: Vec<(chrono::DateTime<chrono::Utc>, BatchId)> = jobs
            .values()
            .filter(|j| j.is_finished())
            .map(|j| (j.submitted_at(), j.id()))
            .collect();
        finished.sort();
        let evicted: Vec<BatchId> = finished.into_iter().take(overflow).map(|(_, id)| id).collect();
        for id in &evicted {
            jobs.remove(id);
            tracing::debug!(batch_id = %id, "evicted finished batch");
        }
        evicted
    }

    /// Look up a job.
    pub fn get(&self, id: &BatchId) -> Option<Arc<BatchJob>> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(id).cloned()
    }

    /// Remove a job, returning `true` if it was present.
    pub fn remove(&self, id: &BatchId) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.remove(id).is_some()
    }

    /// Number of retained jobs.
    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if no jobs are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BatchStore {
    fn default() -> Self {
        Self::new(256)
    }
}
