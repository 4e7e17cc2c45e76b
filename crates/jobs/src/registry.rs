//! Concurrency-safe storage of job records.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use secretary_core::JobId;

use super::types::{JobRecord, JobStatus};

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobStats {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed + self.cancelled
    }
}

/// In-memory keyed store of job records.
///
/// The map lock guards only insertion, lookup, and removal. Records hand out
/// their own per-record locks, so two jobs never contend on the same lock
/// while a body reports progress.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<JobRecord>>>,
    error_capacity: usize,
}

impl JobRegistry {
    /// `error_capacity` bounds each record's per-item error log.
    pub fn new(error_capacity: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            error_capacity,
        }
    }

    pub fn arc(error_capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(error_capacity))
    }

    /// Insert a new pending record and return a shared handle to it.
    pub fn create(&self, job_type: impl Into<String>, total_items: u64) -> Arc<JobRecord> {
        let record = Arc::new(JobRecord::new(job_type, total_items, self.error_capacity));
        let previous = self.write().insert(record.id(), record.clone());
        assert!(previous.is_none(), "job id collision: {}", record.id());
        record
    }

    pub fn get(&self, job_id: JobId) -> Option<Arc<JobRecord>> {
        self.read().get(&job_id).cloned()
    }

    /// List records, oldest first.
    ///
    /// With `include_completed == false` only pending and running jobs are
    /// returned.
    pub fn list(&self, include_completed: bool) -> Vec<Arc<JobRecord>> {
        let mut result: Vec<_> = self
            .read()
            .values()
            .filter(|j| include_completed || !j.status().is_terminal())
            .cloned()
            .collect();

        result.sort_by_key(|j| (j.created_at(), j.id()));
        result
    }

    /// Remove every record matching `predicate`; returns the removed ids.
    pub fn remove_if<F>(&self, mut predicate: F) -> Vec<JobId>
    where
        F: FnMut(&JobRecord) -> bool,
    {
        let mut jobs = self.write();
        let doomed: Vec<JobId> = jobs
            .values()
            .filter(|j| predicate(j))
            .map(|j| j.id())
            .collect();

        for id in &doomed {
            jobs.remove(id);
        }
        doomed
    }

    pub fn stats(&self) -> JobStats {
        let mut stats = JobStats::default();

        for job in self.read().values() {
            match job.status() {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }

        stats
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A poisoned map lock means a bug inside this module; fail loudly.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Arc<JobRecord>>> {
        self.jobs.read().expect("job registry lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Arc<JobRecord>>> {
        self.jobs.write().expect("job registry lock poisoned")
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_ERROR_CAPACITY)
    }
}
