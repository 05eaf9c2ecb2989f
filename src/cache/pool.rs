//! Handle Pool Module
//!
//! Bounds concurrent access to the cache backend. Callers wait for a handle
//! up to the configured timeout; the handle is returned when the guard drops,
//! on every exit path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::error::{AppError, Result};

/// Scoped backend handle.
#[derive(Debug)]
pub struct PoolGuard {
    _permit: OwnedSemaphorePermit,
}

/// Fixed-size handle pool.
#[derive(Debug, Clone)]
pub struct Pool {
    permits: Arc<Semaphore>,
    size: usize,
    acquire_timeout: Duration,
}

impl Pool {
    pub fn new(size: usize, acquire_timeout: Duration) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            acquire_timeout,
        }
    }

    /// Waits for a free handle.
    ///
    /// Fails with `TransientStore` when none frees up within the acquire
    /// timeout.
    pub async fn acquire(&self) -> Result<PoolGuard> {
        match tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => Ok(PoolGuard { _permit: permit }),
            Ok(Err(_)) => Err(AppError::TransientStore("cache pool closed".to_string())),
            Err(_) => {
                warn!(
                    pool_size = self.size,
                    timeout_ms = self.acquire_timeout.as_millis() as u64,
                    "Cache pool exhausted"
                );
                Err(AppError::TransientStore(format!(
                    "no cache handle available within {}ms",
                    self.acquire_timeout.as_millis()
                )))
            }
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
