//! Concurrency limiter
//!
//! Bounds the number of simultaneously running tasks. Excess tasks wait in
//! FIFO order (tokio's semaphore is fair) and exactly one waiter is admitted
//! per completed task, whether it succeeded or failed.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Fixed-capacity admission gate for async tasks
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting at most `max_concurrency` tasks (minimum 1)
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    /// Capacity fixed at construction
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Tasks currently admitted
    pub fn active(&self) -> usize {
        self.max_concurrency - self.available()
    }

    /// Run `task` once a slot is free, releasing the slot when it finishes.
    pub async fn run<F>(&self, task: F) -> Result<F::Output, LimiterError>
    where
        F: Future,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| LimiterError::AcquireError(e.to_string()))?;
        Ok(task.await)
    }
}

/// Limiter errors
#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    /// The semaphore was closed
    #[error("failed to acquire concurrency slot: {0}")]
    AcquireError(String),
}
