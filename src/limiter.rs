//! Concurrency cap for endpoints that hold a pooled connection for long scans.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{AppError, AppResult};

#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl ConcurrencyLimiter {
    pub fn new(permits: usize, acquire_timeout: Duration) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(permits.max(1))), acquire_timeout }
    }

    /// Waits up to the acquire timeout for a slot. The slot is released
    /// when the returned permit is dropped.
    pub async fn acquire(&self) -> AppResult<OwnedSemaphorePermit> {
        match tokio::time::timeout(self.acquire_timeout, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_closed)) => Err(AppError::Internal("Limiter closed".to_string())),
            Err(_elapsed) => {
                tracing::warn!(timeout_ms = self.acquire_timeout.as_millis() as u64, "concurrency limit reached");
                Err(AppError::Busy("Too many concurrent requests, retry shortly".to_string()))
            }
        }
    }

    pub fn available(&self) -> usize { self.semaphore.available_permits() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_saturated_limiter_reports_busy() {
        let limiter = ConcurrencyLimiter::new(1, Duration::from_millis(50));
        let held = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);
        assert!(matches!(limiter.acquire().await, Err(AppError::Busy(_))));

        drop(held);
        assert!(limiter.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_permits_is_raised_to_one() {
        let limiter = ConcurrencyLimiter::new(0, Duration::from_millis(10));
        assert_eq!(limiter.available(), 1);
    }
}
