//! The work-body contract and the progress handle bodies receive.

use std::sync::Arc;

use secretary_core::JobId;

use super::types::{JobProgress, JobRecord};

/// What a work body returns: a result payload, or a failure whose message is
/// recorded verbatim on the job.
pub type WorkResult = anyhow::Result<serde_json::Value>;

/// A unit of batch work run by the engine.
///
/// Implemented for every `FnOnce(&JobHandle) -> WorkResult` closure; implement
/// it directly for bodies that carry their own state.
///
/// Bodies should poll [`JobHandle::is_cancel_requested`] between items and
/// return early once it is set. Nothing interrupts a body that never checks:
/// it keeps its worker slot until it returns, and its result is then
/// discarded as `Cancelled`.
pub trait WorkBody: Send + 'static {
    fn run(self: Box<Self>, job: &JobHandle) -> WorkResult;
}

impl<F> WorkBody for F
where
    F: FnOnce(&JobHandle) -> WorkResult + Send + 'static,
{
    fn run(self: Box<Self>, job: &JobHandle) -> WorkResult {
        (*self)(job)
    }
}

/// Write access to a running job's progress.
///
/// Only the engine creates handles, one per execution, so each job has a
/// single progress writer. Every update takes the record's progress lock
/// briefly; concurrent pollers never see a half-written field.
#[derive(Debug, Clone)]
pub struct JobHandle {
    record: Arc<JobRecord>,
}

impl JobHandle {
    pub(crate) fn new(record: Arc<JobRecord>) -> Self {
        Self { record }
    }

    pub fn id(&self) -> JobId {
        self.record.id()
    }

    pub fn job_type(&self) -> &str {
        self.record.job_type()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.record.is_cancel_requested()
    }

    pub fn progress(&self) -> JobProgress {
        self.record.progress()
    }

    /// Replace the estimated item count.
    pub fn set_total(&self, total: u64) {
        self.record.progress_mut().total = total;
    }

    pub fn set_current_item(&self, item: impl Into<String>) {
        self.record.progress_mut().current_item = item.into();
    }

    pub fn inc_processed(&self) {
        self.record.progress_mut().processed += 1;
    }

    /// Count one processed item that succeeded.
    pub fn record_success(&self) {
        let mut p = self.record.progress_mut();
        p.processed += 1;
        p.succeeded += 1;
    }

    /// Count one processed item that failed and log why.
    pub fn record_failure(&self, message: impl Into<String>) {
        let mut p = self.record.progress_mut();
        p.processed += 1;
        p.failed += 1;
        p.errors.push(message);
    }

    /// Log an error without touching the counters.
    pub fn push_error(&self, message: impl Into<String>) {
        self.record.progress_mut().errors.push(message);
    }

    /// Apply several field updates under one lock acquisition.
    pub fn update<R>(&self, f: impl FnOnce(&mut JobProgress) -> R) -> R {
        let mut progress = self.record.progress_mut();
        f(&mut *progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> JobHandle {
        JobHandle::new(Arc::new(JobRecord::new("batch_archive", 3, 2)))
    }

    #[test]
    fn counters_track_outcomes() {
        let job = handle();
        job.set_current_item("uid 1");
        job.record_success();
        job.set_current_item("uid 2");
        job.record_failure("uid 2: NO [TRYCREATE]");
        job.inc_processed();

        let p = job.progress();
        assert_eq!(p.processed, 3);
        assert_eq!(p.succeeded, 1);
        assert_eq!(p.failed, 1);
        assert_eq!(p.current_item, "uid 2");
        assert_eq!(p.errors.iter().collect::<Vec<_>>(), vec!["uid 2: NO [TRYCREATE]"]);
    }

    #[test]
    fn processed_may_exceed_estimate() {
        let job = handle();
        for _ in 0..5 {
            job.record_success();
        }
        let p = job.progress();
        assert_eq!(p.total, 3);
        assert_eq!(p.processed, 5);
    }

    #[test]
    fn error_log_respects_record_capacity() {
        let job = handle();
        for i in 0..10 {
            job.push_error(format!("error {i}"));
        }
        let p = job.progress();
        assert_eq!(p.errors.len(), 2);
        assert_eq!(p.errors.recent(2), vec!["error 8", "error 9"]);
        assert_eq!(p.failed, 0);
    }

    #[test]
    fn update_batches_fields() {
        let job = handle();
        let processed = job.update(|p| {
            p.total = 10;
            p.processed = 4;
            p.processed
        });
        assert_eq!(processed, 4);
        assert_eq!(job.progress().total, 10);
    }

    #[test]
    fn closures_are_work_bodies() {
        let job = handle();
        let body: Box<dyn WorkBody> = Box::new(|job: &JobHandle| -> WorkResult {
            job.record_success();
            Ok(serde_json::json!({"done": job.progress().processed}))
        });
        assert_eq!(body.run(&job).unwrap(), serde_json::json!({"done": 1}));
    }
}
