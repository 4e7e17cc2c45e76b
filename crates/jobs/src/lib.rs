//! `secretary-jobs` — background job engine for long-running mailbox and
//! calendar batch operations.
//!
//! ## Design
//!
//! - Bounded worker pool: submission never blocks, excess work queues FIFO
//! - Live progress: bodies report counters, current item, and a bounded error log
//! - Cooperative cancellation: a write-once flag the body polls between items
//! - Retention: finished jobs are swept after a configurable age
//!
//! ## Components
//!
//! - `JobRecord`: identity, lifecycle, and progress of one job
//! - `JobRegistry`: keyed store of records; the only map-level lock
//! - `WorkerPool`: fixed set of threads running queued tasks
//! - `JobEngine`: submission, lifecycle wrapper, cancel, cleanup, stats
//! - `WorkBody` / `JobHandle`: the contract with the code doing the work
//!
//! ## Lifecycle
//!
//! ```text
//! Pending --(worker picks up)--> Running --(body returns)--> Completed
//!                                        --(returns after cancel)--> Cancelled
//!                                        --(body errors or panics)--> Failed
//! ```

pub mod config;
pub mod engine;
pub mod handle;
pub mod pool;
pub mod registry;
pub mod retention;
pub mod types;

pub use config::{ConfigError, JobEngineConfig, RetentionConfig};
pub use engine::JobEngine;
pub use handle::{JobHandle, WorkBody, WorkResult};
pub use pool::{PoolClosed, WorkerPool};
pub use registry::{JobRegistry, JobStats};
pub use retention::RetentionSweeper;
pub use secretary_core::JobId;
pub use types::{
    CancelOutcome, CancelReply, CleanupReport, ErrorLog, JobProgress, JobRecord, JobSnapshot,
    JobStatus, ProgressSnapshot, SNAPSHOT_ERROR_LIMIT,
};
