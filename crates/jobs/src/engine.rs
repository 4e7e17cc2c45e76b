//! Job engine: submission, lifecycle enforcement, cancellation, cleanup.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use secretary_core::JobId;

use super::config::JobEngineConfig;
use super::handle::{JobHandle, WorkBody};
use super::pool::WorkerPool;
use super::registry::{JobRegistry, JobStats};
use super::retention::{self, RetentionSweeper};
use super::types::{BodyOutcome, CancelOutcome, JobRecord, JobSnapshot, JobStatus};

/// Runs batch work off the request path.
///
/// One engine per process, constructed by the composition root and shared by
/// reference (typically `Arc<JobEngine>`) with whatever exposes job status.
/// Dropping the engine stops the retention sweeper, lets queued jobs finish,
/// and joins the worker threads.
#[derive(Debug)]
pub struct JobEngine {
    // Field order is drop order: stop sweeping before draining the pool.
    sweeper: Option<RetentionSweeper>,
    pool: WorkerPool,
    registry: Arc<JobRegistry>,
    config: JobEngineConfig,
}

impl JobEngine {
    /// Spawn the worker pool (and retention sweeper, if configured).
    pub fn start(config: JobEngineConfig) -> io::Result<Self> {
        let registry = JobRegistry::arc(config.error_capacity);
        let pool = WorkerPool::new(config.max_workers, &config.thread_name_prefix)?;

        let sweeper = match config.retention {
            Some(retention) => Some(RetentionSweeper::spawn(
                registry.clone(),
                retention,
                format!("{}-retention", config.thread_name_prefix),
            )?),
            None => None,
        };

        info!(
            workers = pool.size(),
            retention = sweeper.is_some(),
            "job engine started"
        );

        Ok(Self {
            sweeper,
            pool,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &JobEngineConfig {
        &self.config
    }

    /// Submit a closure as a new job.
    ///
    /// Returns at once with the live record, created `Pending`; the body runs
    /// when a worker frees up. `total_items` seeds `progress.total` and may be
    /// zero when the size is unknown.
    pub fn submit<F>(&self, job_type: impl Into<String>, total_items: u64, body: F) -> Arc<JobRecord>
    where
        F: FnOnce(&JobHandle) -> anyhow::Result<serde_json::Value> + Send + 'static,
    {
        self.submit_body(job_type, total_items, body)
    }

    /// Submit any [`WorkBody`] as a new job.
    pub fn submit_body<B: WorkBody>(
        &self,
        job_type: impl Into<String>,
        total_items: u64,
        body: B,
    ) -> Arc<JobRecord> {
        let record = self.registry.create(job_type, total_items);
        let body: Box<dyn WorkBody> = Box::new(body);

        let task_record = record.clone();
        if self.pool.execute(move || run_job(task_record, body)).is_err() {
            // Only reachable while the pool is being torn down.
            if record.mark_running() {
                record.finish(BodyOutcome::Failed("job engine is shutting down".to_string()));
            }
            warn!(job_id = %record.id(), "job rejected: worker pool closed");
        }

        record
    }

    /// Live record for `job_id`, or `None` if unknown or already swept.
    pub fn get(&self, job_id: JobId) -> Option<Arc<JobRecord>> {
        self.registry.get(job_id)
    }

    pub fn snapshot(&self, job_id: JobId) -> Option<JobSnapshot> {
        self.registry.get(job_id).map(|j| j.snapshot())
    }

    /// Jobs oldest first; only pending/running ones unless `include_completed`.
    pub fn list(&self, include_completed: bool) -> Vec<Arc<JobRecord>> {
        self.registry.list(include_completed)
    }

    pub fn list_snapshots(&self, include_completed: bool) -> Vec<JobSnapshot> {
        self.list(include_completed)
            .iter()
            .map(|j| j.snapshot())
            .collect()
    }

    /// Request cooperative cancellation.
    ///
    /// Sets the job's cancel flag; the running body is never interrupted. A
    /// pending job still starts, so its body gets the chance to observe the
    /// flag and return early.
    pub fn try_cancel(&self, job_id: JobId) -> CancelOutcome {
        let Some(record) = self.registry.get(job_id) else {
            return CancelOutcome::NotFound;
        };

        match record.request_cancel() {
            Ok(status) => {
                info!(job_id = %job_id, status = %status, "cancellation requested");
                CancelOutcome::Accepted
            }
            Err(status) => CancelOutcome::AlreadyTerminal(status),
        }
    }

    /// [`try_cancel`](Self::try_cancel) folded to a bool: false covers both
    /// unknown ids and already-finished jobs.
    pub fn cancel(&self, job_id: JobId) -> bool {
        self.try_cancel(job_id).accepted()
    }

    /// Remove finished jobs completed more than `max_age` ago; returns how
    /// many were removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        retention::sweep(&self.registry, max_age)
    }

    pub fn stats(&self) -> JobStats {
        self.registry.stats()
    }

    /// Stop accepting work, finish queued jobs, and join all threads.
    pub fn shutdown(self) {
        info!(pending = self.registry.stats().pending, "shutting down job engine");
        drop(self);
    }
}

/// Execution wrapper run on a pool thread.
fn run_job(record: Arc<JobRecord>, body: Box<dyn WorkBody>) {
    if !record.mark_running() {
        warn!(job_id = %record.id(), status = %record.status(), "job was not pending; skipping");
        return;
    }
    info!(job_id = %record.id(), job_type = record.job_type(), "job started");

    let handle = JobHandle::new(record.clone());
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| body.run(&handle))) {
        Ok(Ok(value)) => BodyOutcome::Returned(value),
        Ok(Err(err)) => BodyOutcome::Failed(failure_message(format!("{err:#}"))),
        Err(payload) => BodyOutcome::Failed(failure_message(panic_message(payload.as_ref()))),
    };

    match record.finish(outcome) {
        JobStatus::Completed => {
            let progress = record.progress();
            info!(
                job_id = %record.id(),
                succeeded = progress.succeeded,
                failed = progress.failed,
                "job completed"
            );
        }
        JobStatus::Cancelled => {
            info!(job_id = %record.id(), processed = record.progress().processed, "job cancelled");
        }
        JobStatus::Failed => {
            error!(
                job_id = %record.id(),
                job_type = record.job_type(),
                error = %record.error().unwrap_or_default(),
                "job failed"
            );
        }
        JobStatus::Pending | JobStatus::Running => {}
    }
}

fn failure_message(message: String) -> String {
    if message.is_empty() {
        "job failed without an error message".to_string()
    } else {
        message
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("job panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("job panicked: {s}")
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(panic_message(boxed.as_ref()), "job panicked: index out of bounds");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("mailbox gone"));
        assert_eq!(panic_message(boxed.as_ref()), "job panicked: mailbox gone");

        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "job panicked");
    }

    #[test]
    fn empty_failure_message_is_replaced() {
        assert_eq!(failure_message(String::new()), "job failed without an error message");
        assert_eq!(failure_message("boom".to_string()), "boom");
    }

    #[test]
    fn engine_runs_body_to_completion() {
        let engine = JobEngine::start(JobEngineConfig::default().with_thread_name_prefix("unit-job"))
            .unwrap();
        let job = engine.submit("batch_archive", 2, |job| {
            job.record_success();
            job.record_success();
            Ok(serde_json::json!({"archived": 2}))
        });
        let id = job.id();

        engine.shutdown();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.result(), Some(serde_json::json!({"archived": 2})));
        assert_eq!(job.progress().succeeded, 2);
        assert_eq!(job.id(), id);
    }
}
