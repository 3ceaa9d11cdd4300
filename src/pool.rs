//! Bounded worker pool
//!
//! A fixed number of workers pull jobs from a bounded queue. Shutdown stops
//! accepting work, waits a grace period for in-flight jobs, then cancels
//! whatever is left; handles of cancelled jobs resolve to `Cancelled`.

use crate::error::ReaperError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Result slot of a submitted job
pub struct JobHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> JobHandle<T> {
    /// Wait for the job; `Cancelled` when it was dropped by a forced shutdown
    pub async fn join(self) -> Result<T, ReaperError> {
        self.rx.await.map_err(|_| ReaperError::Cancelled)
    }
}

/// How a shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every queued and in-flight job finished inside the grace period
    Graceful,
    /// The grace period ran out and remaining jobs were cancelled
    Forced,
}

pub struct WorkerPool {
    size: usize,
    sender: std::sync::Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<JoinSet<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn `size` workers over a queue holding at most `capacity` jobs
    pub fn new(size: usize, capacity: usize) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel::<Job>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let mut workers = JoinSet::new();
        for id in 0..size {
            workers.spawn(worker(id, Arc::clone(&rx), cancel.clone()));
        }
        tracing::debug!("Worker pool started: {} workers, queue {}", size, capacity);

        Self {
            size,
            sender: std::sync::Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            cancel,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue a job, waiting for room when the queue is full
    pub async fn submit<F, T>(&self, job: F) -> Result<JobHandle<T>, ReaperError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(ReaperError::PoolClosed)?;

        let (tx, rx) = oneshot::channel();
        let wrapped: Job = Box::pin(async move {
            let _ = tx.send(job.await);
        });

        sender
            .send(wrapped)
            .await
            .map_err(|_| ReaperError::PoolClosed)?;
        Ok(JobHandle { rx })
    }

    /// Stop accepting work and wait up to `grace` before cancelling the rest
    pub async fn shutdown(&self, grace: Duration) -> ShutdownOutcome {
        // Dropping the last sender closes the queue; workers exit once it drains
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let mut workers = self.workers.lock().await;
        let drained = tokio::time::timeout(grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => {
                tracing::debug!("Worker pool shut down gracefully");
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                tracing::warn!(
                    "Worker pool grace period of {:?} elapsed, cancelling remaining jobs",
                    grace
                );
                self.cancel.cancel();
                while workers.join_next().await.is_some() {}
                ShutdownOutcome::Forced
            }
        }
    }
}

async fn worker(id: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>, cancel: CancellationToken) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            job = async { rx.lock().await.recv().await } => job,
        };
        let Some(job) = next else {
            break;
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::warn!("Worker {} dropped its in-flight job on cancellation", id);
                break;
            }
            _ = job => {}
        }
    }
    tracing::trace!("Worker {} exiting", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_jobs_run_and_return_values() {
        let pool = WorkerPool::new(2, 4);
        let mut handles = Vec::new();
        for i in 0..10u32 {
            handles.push(pool.submit(async move { i * 2 }).await.unwrap());
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.join().await.unwrap());
        }
        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
        assert_eq!(pool.shutdown(Duration::from_secs(1)).await, ShutdownOutcome::Graceful);
    }

    #[tokio::test]
    async fn test_graceful_shutdown_finishes_queued_work() {
        let pool = WorkerPool::new(1, 8);
        let done = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let done = Arc::clone(&done);
            handles.push(
                pool.submit(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .await
                .unwrap(),
            );
        }

        assert_eq!(pool.shutdown(Duration::from_secs(5)).await, ShutdownOutcome::Graceful);
        assert_eq!(done.load(Ordering::SeqCst), 5);
        for handle in handles {
            assert!(handle.join().await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_forced_shutdown_cancels_remaining_jobs() {
        let pool = WorkerPool::new(1, 4);
        let slow = pool
            .submit(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
            .await
            .unwrap();
        let queued = pool.submit(async { 1 }).await.unwrap();

        assert_eq!(pool.shutdown(Duration::from_millis(50)).await, ShutdownOutcome::Forced);
        assert!(matches!(slow.join().await, Err(ReaperError::Cancelled)));
        assert!(matches!(queued.join().await, Err(ReaperError::Cancelled)));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(1, 1);
        pool.shutdown(Duration::from_millis(10)).await;
        assert!(matches!(
            pool.submit(async {}).await,
            Err(ReaperError::PoolClosed)
        ));
    }
}
