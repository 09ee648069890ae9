//! Bounded worker pool with non-blocking submission
//!
//! A pool is a semaphore of `capacity` permits shared by every caller in the
//! process. Each submitted task holds one permit until it finishes. When no
//! permit is free the submission is rejected immediately instead of queueing.

use crate::{Error, Result};

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Spawn `task` on the runtime if a permit is free.
    pub fn try_spawn<F>(&self, task: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = self.acquire()?;
        Ok(tokio::spawn(async move {
            let _permit = permit;
            task.await
        }))
    }

    /// Run CPU-bound `work` on the blocking thread pool if a permit is free.
    pub fn try_spawn_blocking<F, T>(&self, work: F) -> Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.acquire()?;
        Ok(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        }))
    }

    fn acquire(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        Arc::clone(&self.permits).try_acquire_owned().map_err(|_| {
            warn!(capacity = self.capacity, "Worker pool saturated");
            Error::PoolSaturated {
                capacity: self.capacity,
            }
        })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_rejects_when_saturated() {
        let pool = WorkerPool::new(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let first = pool
            .try_spawn(async move {
                let _ = release_rx.await;
                1
            })
            .unwrap();
        assert_eq!(pool.available(), 0);

        let rejected = pool.try_spawn(async { 2 });
        assert!(matches!(rejected, Err(Error::PoolSaturated { capacity: 1 })));

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.try_spawn(async { 3 }).unwrap().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_blocking_work_releases_permit() {
        let pool = WorkerPool::new(2);
        let handle = pool.try_spawn_blocking(|| (0..100u64).sum::<u64>()).unwrap();
        assert_eq!(handle.await.unwrap(), 4950);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.capacity(), 2);
    }
}
