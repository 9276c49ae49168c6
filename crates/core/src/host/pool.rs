//! Bounded worker pool for blocking library calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use super::error::HostError;
use super::types::PoolStatus;
use crate::metrics::{WORKER_POOL_ACTIVE, WORKER_POOL_QUEUED};

/// Tracks statistics for the worker pool.
#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    queued: AtomicU64,
    total_completed: AtomicU64,
    total_failed: AtomicU64,
}

impl PoolStats {
    fn to_status(&self, max_workers: usize) -> PoolStatus {
        PoolStatus {
            active_jobs: self.active.load(Ordering::Relaxed) as usize,
            max_workers,
            queued_jobs: self.queued.load(Ordering::Relaxed) as usize,
            total_completed: self.total_completed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Queued,
    Active,
}

/// Counts a job in `slot` until dropped.
struct SlotGuard {
    stats: Arc<PoolStats>,
    slot: Slot,
}

impl SlotGuard {
    fn enter(stats: &Arc<PoolStats>, slot: Slot) -> Self {
        match slot {
            Slot::Queued => {
                stats.queued.fetch_add(1, Ordering::Relaxed);
                WORKER_POOL_QUEUED.inc();
            }
            Slot::Active => {
                stats.active.fetch_add(1, Ordering::Relaxed);
                WORKER_POOL_ACTIVE.inc();
            }
        }
        Self {
            stats: Arc::clone(stats),
            slot,
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        match self.slot {
            Slot::Queued => {
                self.stats.queued.fetch_sub(1, Ordering::Relaxed);
                WORKER_POOL_QUEUED.dec();
            }
            Slot::Active => {
                self.stats.active.fetch_sub(1, Ordering::Relaxed);
                WORKER_POOL_ACTIVE.dec();
            }
        }
    }
}

/// Runs synchronous work on the blocking thread pool, at most `max_workers` at a time.
///
/// Admission is FIFO: tokio's semaphore queues waiters in arrival order, so a
/// saturated pool makes callers wait instead of spawning more threads.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    max_workers: usize,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            stats: Arc::new(PoolStats::default()),
        }
    }

    /// Executes `f` off the async executor and returns its result.
    ///
    /// The permit and the active slot travel with the blocking job, so a
    /// caller that stops waiting does not free capacity the job still uses.
    pub async fn run<F, T>(&self, f: F) -> Result<T, HostError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let queued = SlotGuard::enter(&self.stats, Slot::Queued);
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| HostError::PoolClosed)?;
        drop(queued);

        let active = SlotGuard::enter(&self.stats, Slot::Active);
        debug!(
            "Worker pool: {} active of {}",
            self.stats.active.load(Ordering::Relaxed),
            self.max_workers
        );

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _active = active;
            f()
        })
        .await;

        match result {
            Ok(value) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(e) => {
                self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
                Err(HostError::WorkerFailed(e.to_string()))
            }
        }
    }

    /// Current pool statistics.
    pub fn status(&self) -> PoolStatus {
        self.stats.to_status(self.max_workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_blocking_work() {
        let pool = WorkerPool::new(2);
        let value = pool.run(|| 21 * 2).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.status().total_completed, 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let pool = WorkerPool::new(1);
        let result: Result<(), _> = pool.run(|| panic!("boom")).await;
        assert!(matches!(result, Err(HostError::WorkerFailed(_))));
        assert_eq!(pool.status().total_failed, 1);
        // The permit was released despite the panic.
        assert_eq!(pool.run(|| 1).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let pool = pool.clone();
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    pool.run(move || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(50));
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.status().total_completed, 6);
        assert_eq!(pool.status().active_jobs, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_caller_keeps_its_slot_until_the_job_ends() {
        let pool = WorkerPool::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let job = |running: Arc<AtomicUsize>, peak: Arc<AtomicUsize>, ms: u64| {
            move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(ms));
                running.fetch_sub(1, Ordering::SeqCst);
            }
        };

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            pool.run(job(Arc::clone(&running), Arc::clone(&peak), 300)),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(pool.status().active_jobs, 1);

        pool.run(job(Arc::clone(&running), Arc::clone(&peak), 10))
            .await
            .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        let status = pool.status();
        assert_eq!(status.active_jobs, 0);
        assert_eq!(status.queued_jobs, 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_the_queue() {
        let pool = WorkerPool::new(1);
        let holder = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.run(|| std::thread::sleep(Duration::from_millis(200)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter = tokio::time::timeout(Duration::from_millis(20), pool.run(|| ())).await;
        assert!(waiter.is_err());
        assert_eq!(pool.status().queued_jobs, 0);

        holder.await.unwrap().unwrap();
        assert_eq!(pool.status().active_jobs, 0);
    }
}
