//! Fixed-size worker thread pool.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tracing::{debug, error};

/// Unit of work accepted by the pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Returned when the pool no longer accepts tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

/// Bounded set of worker threads fed from an unbounded FIFO queue.
///
/// [`execute`](Self::execute) never blocks: when every worker is busy the
/// task waits in the queue. Dropping the pool closes the queue, lets workers
/// drain what is already queued, and joins them.
#[derive(Debug)]
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Task>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) named `{name_prefix}-{n}`.
    pub fn new(size: usize, name_prefix: &str) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size.max(1))
            .map(|n| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("{name_prefix}-{n}"))
                    .spawn(move || worker_loop(receiver))
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task for execution.
    pub fn execute<F>(&self, task: F) -> Result<(), PoolClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(PoolClosed)?;
        sender.send(Box::new(task)).map_err(|_| PoolClosed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<mpsc::Receiver<Task>>>) {
    debug!("job worker started");

    loop {
        // The guard is a temporary of this statement, so the lock is
        // released before the task runs.
        let next = match receiver.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => break,
        };

        match next {
            Ok(task) => {
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!("worker task panicked; worker keeps serving the queue");
                }
            }
            Err(_) => break,
        }
    }

    debug!("job worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_all_queued_tasks_before_drop_returns() {
        let pool = WorkerPool::new(2, "test-pool").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let counter = counter.clone();
            pool.execute(move || {
                thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn never_exceeds_pool_size() {
        let pool = WorkerPool::new(3, "test-pool").unwrap();
        assert_eq!(pool.size(), 3);

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..12 {
            let active = active.clone();
            let peak = peak.clone();
            pool.execute(move || {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                active.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        drop(pool);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak concurrency was {peak}");
    }

    #[test]
    fn execute_does_not_block_when_saturated() {
        let pool = WorkerPool::new(1, "test-pool").unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        pool.execute(move || {
            let _ = release_rx.recv();
        })
        .unwrap();

        // The only worker is parked; these must still return immediately.
        for _ in 0..100 {
            pool.execute(|| {}).unwrap();
        }

        release_tx.send(()).unwrap();
    }

    #[test]
    fn panicking_task_does_not_shrink_pool() {
        let pool = WorkerPool::new(1, "test-pool").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        pool.execute(|| panic!("task blew up")).unwrap();
        let after = counter.clone();
        pool.execute(move || {
            after.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_size_spawns_one_worker() {
        let pool = WorkerPool::new(0, "test-pool").unwrap();
        assert_eq!(pool.size(), 1);
    }
}
