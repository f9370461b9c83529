// SPDX-License-Identifier: PMPL-1.0-or-later
//! Bounded worker pool for source queries.
//!
//! At most `max_concurrent` source queries run at once. Submissions beyond
//! that wait in a queue of at most `max_queued` entries; past that they are
//! rejected. The pool is shared by every federation run through the same
//! strategy, so one large fan-out cannot starve the process of tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use catfed_core::SourceError;

use crate::config::FederationConfig;

struct PoolInner {
    permits: Arc<Semaphore>,
    queued: AtomicUsize,
    max_concurrent: usize,
    max_queued: usize,
}

/// Cheaply cloneable handle to a shared pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

/// Result of submitting a task to the pool.
pub(crate) enum Admission {
    /// A worker was free; the task may run immediately.
    Running(OwnedSemaphorePermit),
    /// The task holds a queue slot and must wait for a worker.
    Queued(QueueTicket),
}

/// A reserved queue slot, released when dropped.
pub(crate) struct QueueTicket {
    pool: WorkerPool,
}

impl QueueTicket {
    /// Wait for a worker. `None` if the pool shut down while waiting.
    pub(crate) async fn wait(self) -> Option<OwnedSemaphorePermit> {
        self.pool.inner.permits.clone().acquire_owned().await.ok()
    }
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        self.pool.inner.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerPool {
    pub fn new(max_concurrent: usize, max_queued: usize) -> Self {
        let max_concurrent = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(max_concurrent)),
                queued: AtomicUsize::new(0),
                max_concurrent,
                max_queued,
            }),
        }
    }

    pub fn from_config(config: &FederationConfig) -> Self {
        Self::new(config.max_concurrent_queries, config.max_queued_queries)
    }

    /// Admit a task: a free worker, else a queue slot, else rejection.
    pub(crate) fn admit(&self) -> Result<Admission, SourceError> {
        match self.inner.permits.clone().try_acquire_owned() {
            Ok(permit) => return Ok(Admission::Running(permit)),
            Err(TryAcquireError::Closed) => {
                return Err(SourceError::Rejected("worker pool is shut down".to_string()))
            }
            Err(TryAcquireError::NoPermits) => {}
        }

        let reserved = self
            .inner
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                (queued < self.inner.max_queued).then_some(queued + 1)
            });
        match reserved {
            Ok(_) => Ok(Admission::Queued(QueueTicket { pool: self.clone() })),
            Err(_) => Err(SourceError::Rejected(format!(
                "all {} workers busy and {} queries already queued",
                self.inner.max_concurrent, self.inner.max_queued
            ))),
        }
    }

    /// Stop accepting work. Queued tasks are released without a worker.
    pub fn shutdown(&self) {
        self.inner.permits.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.permits.is_closed()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    pub fn available_permits(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("max_concurrent", &self.inner.max_concurrent)
            .field("max_queued", &self.inner.max_queued)
            .field("available", &self.available_permits())
            .field("queued", &self.queued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admission_run_queue_reject() {
        let pool = WorkerPool::new(1, 1);

        let running = match pool.admit() {
            Ok(Admission::Running(permit)) => permit,
            _ => panic!("first task should run immediately"),
        };
        let ticket = match pool.admit() {
            Ok(Admission::Queued(ticket)) => ticket,
            _ => panic!("second task should queue"),
        };
        assert_eq!(pool.queued(), 1);
        assert!(matches!(pool.admit(), Err(SourceError::Rejected(_))));

        drop(running);
        let permit = ticket.wait().await;
        assert!(permit.is_some());
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_and_releases_queue() {
        let pool = WorkerPool::new(1, 4);
        let _running = match pool.admit() {
            Ok(Admission::Running(permit)) => permit,
            _ => panic!("expected a free worker"),
        };
        let ticket = match pool.admit() {
            Ok(Admission::Queued(ticket)) => ticket,
            _ => panic!("expected a queue slot"),
        };

        pool.shutdown();
        assert!(pool.is_shut_down());
        assert!(ticket.wait().await.is_none());
        assert!(matches!(pool.admit(), Err(SourceError::Rejected(_))));
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let pool = WorkerPool::new(0, 0);
        assert_eq!(pool.max_concurrent(), 1);
        assert_eq!(pool.available_permits(), 1);
    }
}
