//! Retention cleanup of finished jobs.

use std::io;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use super::config::RetentionConfig;
use super::registry::JobRegistry;

/// Remove terminal jobs whose `completed_at` is more than `max_age` ago.
///
/// Pending and running jobs are never removed, however old.
pub fn sweep(registry: &JobRegistry, max_age: Duration) -> usize {
    let Some(cutoff) = chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
    else {
        // Older than anything representable: nothing qualifies.
        return 0;
    };

    let removed = registry.remove_if(|job| {
        job.status().is_terminal() && job.completed_at().is_some_and(|at| at < cutoff)
    });

    if !removed.is_empty() {
        info!(removed = removed.len(), "cleaned up old jobs");
    }
    removed.len()
}

/// Background thread running [`sweep`] on a fixed interval.
#[derive(Debug)]
pub struct RetentionSweeper {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl RetentionSweeper {
    pub fn spawn(
        registry: Arc<JobRegistry>,
        config: RetentionConfig,
        name: impl Into<String>,
    ) -> io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(name.into())
            .spawn(move || sweeper_loop(&registry, config, shutdown_rx))?;

        Ok(Self {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    /// Stop the sweeper and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl Drop for RetentionSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sweeper_loop(registry: &JobRegistry, config: RetentionConfig, shutdown_rx: mpsc::Receiver<()>) {
    debug!(
        interval_secs = config.interval.as_secs_f64(),
        max_age_secs = config.max_age.as_secs(),
        "retention sweeper started"
    );

    loop {
        match shutdown_rx.recv_timeout(config.interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                sweep(registry, config.max_age);
            }
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("retention sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BodyOutcome;
    use std::time::Instant;

    fn finished(registry: &JobRegistry) -> Arc<crate::JobRecord> {
        let job = registry.create("batch_archive", 0);
        job.mark_running();
        job.finish(BodyOutcome::Returned(serde_json::Value::Null));
        job
    }

    #[test]
    fn sweep_removes_only_old_terminal_jobs() {
        let registry = JobRegistry::default();
        let pending = registry.create("batch_archive", 0);
        let running = registry.create("batch_archive", 0);
        running.mark_running();
        let done = finished(&registry);

        thread::sleep(Duration::from_millis(20));
        let fresh = finished(&registry);

        assert_eq!(sweep(&registry, Duration::from_millis(10)), 1);
        assert!(registry.get(done.id()).is_none());
        assert!(registry.get(fresh.id()).is_some());
        assert!(registry.get(pending.id()).is_some());
        assert!(registry.get(running.id()).is_some());
    }

    #[test]
    fn sweep_with_huge_max_age_removes_nothing() {
        let registry = JobRegistry::default();
        finished(&registry);
        assert_eq!(sweep(&registry, Duration::MAX), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sweeper_runs_periodically_and_stops() {
        let registry = JobRegistry::arc(10);
        let done = finished(&registry);

        let sweeper = RetentionSweeper::spawn(
            registry.clone(),
            RetentionConfig {
                interval: Duration::from_millis(10),
                max_age: Duration::ZERO,
            },
            "test-retention",
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while registry.get(done.id()).is_some() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(registry.get(done.id()).is_none());

        let stopping = Instant::now();
        sweeper.shutdown();
        assert!(stopping.elapsed() < Duration::from_secs(1));
    }
}
