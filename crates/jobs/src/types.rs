//! Job records, progress state, and the status model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use secretary_core::JobId;

/// Number of error messages exposed in a status snapshot.
pub const SNAPSHOT_ERROR_LIMIT: usize = 10;

/// Job execution status.
///
/// ```text
/// Pending -> Running -> Completed | Failed | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for a free worker
    Pending,
    /// Body is executing on a worker thread
    Running,
    /// Body returned normally and no cancellation was requested
    Completed,
    /// Body returned an error or panicked
    Failed,
    /// Body returned after cancellation was requested
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-capacity log of per-item error messages.
///
/// When full, the oldest message is dropped to make room for the newest one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLog {
    entries: VecDeque<String>,
    capacity: usize,
    dropped: u64,
}

impl ErrorLog {
    /// Storage grows on demand up to `capacity`; nothing is reserved upfront.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(message.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages discarded because the log was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Oldest-to-newest iteration over the retained messages.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// The `n` most recent messages, oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

/// Progress of a job, written by its work body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub total: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub current_item: String,
    pub errors: ErrorLog,
}

impl JobProgress {
    pub fn new(total: u64, error_capacity: usize) -> Self {
        Self {
            total,
            processed: 0,
            succeeded: 0,
            failed: 0,
            current_item: String::new(),
            errors: ErrorLog::with_capacity(error_capacity),
        }
    }
}

/// Terminal outcome of a work body, as seen by the execution wrapper.
#[derive(Debug)]
pub(crate) enum BodyOutcome {
    Returned(serde_json::Value),
    Failed(String),
}

#[derive(Debug)]
struct Lifecycle {
    status: JobStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

/// A background job.
///
/// Identity fields are immutable. Status and timestamps are guarded by one
/// per-record lock and written only by the engine; progress has its own lock
/// and is written only by the job's work body through a [`JobHandle`].
///
/// [`JobHandle`]: crate::JobHandle
#[derive(Debug)]
pub struct JobRecord {
    id: JobId,
    job_type: String,
    created_at: DateTime<Utc>,
    cancel_requested: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    progress: Mutex<JobProgress>,
}

impl JobRecord {
    /// Create a new pending job. Only the registry creates records.
    pub(crate) fn new(job_type: impl Into<String>, total_items: u64, error_capacity: usize) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            created_at: Utc::now(),
            cancel_requested: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle {
                status: JobStatus::Pending,
                started_at: None,
                completed_at: None,
                result: None,
                error: None,
            }),
            progress: Mutex::new(JobProgress::new(total_items, error_capacity)),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> JobStatus {
        self.lifecycle().status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lifecycle().started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.lifecycle().completed_at
    }

    /// Payload returned by the body; only set on `Completed`.
    pub fn result(&self) -> Option<serde_json::Value> {
        self.lifecycle().result.clone()
    }

    /// Failure message; only set on `Failed`.
    pub fn error(&self) -> Option<String> {
        self.lifecycle().error.clone()
    }

    /// Once true, stays true.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Copy of the current progress.
    pub fn progress(&self) -> JobProgress {
        self.progress_mut().clone()
    }

    /// Serializable point-in-time view of the record.
    ///
    /// Lifecycle and progress are read under separate locks, so a snapshot
    /// taken while the body runs is not atomic across the two.
    pub fn snapshot(&self) -> JobSnapshot {
        let (status, started_at, completed_at, result, error) = {
            let lc = self.lifecycle();
            (
                lc.status,
                lc.started_at,
                lc.completed_at,
                lc.result.clone(),
                lc.error.clone(),
            )
        };
        let progress = {
            let p = self.progress_mut();
            ProgressSnapshot {
                total: p.total,
                processed: p.processed,
                succeeded: p.succeeded,
                failed: p.failed,
                current_item: p.current_item.clone(),
                errors: p.errors.recent(SNAPSHOT_ERROR_LIMIT),
            }
        };

        JobSnapshot {
            id: self.id,
            job_type: self.job_type.clone(),
            status,
            progress,
            created_at: self.created_at,
            started_at,
            completed_at,
            result,
            error,
        }
    }

    /// Pending -> Running. Returns false if the job was not pending.
    pub(crate) fn mark_running(&self) -> bool {
        let mut lc = self.lifecycle();
        if lc.status != JobStatus::Pending {
            return false;
        }
        lc.status = JobStatus::Running;
        lc.started_at = Some(Utc::now());
        true
    }

    /// Running -> terminal, classifying the body's outcome.
    ///
    /// A record that is not running is left untouched and its current status
    /// returned, so terminal fields are written exactly once.
    ///
    /// The cancel flag is read under the lifecycle lock, the same lock
    /// [`request_cancel`](Self::request_cancel) holds while setting it, so an
    /// accepted cancellation always ends in `Cancelled` unless the body failed.
    pub(crate) fn finish(&self, outcome: BodyOutcome) -> JobStatus {
        let mut lc = self.lifecycle();
        if lc.status != JobStatus::Running {
            return lc.status;
        }

        let status = match outcome {
            BodyOutcome::Failed(message) => {
                lc.error = Some(message);
                JobStatus::Failed
            }
            BodyOutcome::Returned(_) if self.is_cancel_requested() => JobStatus::Cancelled,
            BodyOutcome::Returned(value) => {
                lc.result = Some(value);
                JobStatus::Completed
            }
        };

        lc.status = status;
        lc.completed_at = Some(Utc::now());
        status
    }

    /// Set the cancel flag unless the job is already terminal.
    ///
    /// Returns the status observed while deciding.
    pub(crate) fn request_cancel(&self) -> Result<JobStatus, JobStatus> {
        let lc = self.lifecycle();
        if lc.status.is_terminal() {
            return Err(lc.status);
        }
        self.cancel_requested.store(true, Ordering::Release);
        Ok(lc.status)
    }

    pub(crate) fn progress_mut(&self) -> MutexGuard<'_, JobProgress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Progress portion of a [`JobSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub current_item: String,
    /// At most [`SNAPSHOT_ERROR_LIMIT`] most recent messages, oldest first.
    pub errors: Vec<String>,
}

/// Status payload handed to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub job_type: String,
    pub status: JobStatus,
    pub progress: ProgressSnapshot,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "CancelReply")]
pub enum CancelOutcome {
    /// The cancel flag is now set; the body will observe it cooperatively.
    Accepted,
    /// No job with that id (never existed, or already swept).
    NotFound,
    /// The job had already finished with the given status.
    AlreadyTerminal(JobStatus),
}

impl CancelOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, CancelOutcome::Accepted)
    }
}

/// Wire shape of a [`CancelOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReply {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<CancelOutcome> for CancelReply {
    fn from(outcome: CancelOutcome) -> Self {
        let reason = match outcome {
            CancelOutcome::Accepted => None,
            CancelOutcome::NotFound => Some("job not found".to_string()),
            CancelOutcome::AlreadyTerminal(status) => {
                Some(format!("cannot cancel job in status: {status}"))
            }
        };
        Self {
            accepted: outcome.accepted(),
            reason,
        }
    }
}

/// Result of a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub removed_count: usize,
}
