use std::future::Future;
use std::time::Duration;

use crate::storage::StorageError;

/// Bounded retry policy for storage operations.
///
/// Delays double per attempt starting from `base_delay` and are capped at
/// `max_delay`. Only errors classified as retriable by
/// [`StorageError::is_retriable`] are retried; everything else is returned
/// to the caller immediately.
#[derive(Clone, Copy, Debug)]
pub struct Retrier {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for Retrier {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl Retrier {
    #[cfg(test)]
    fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Runs `op` until it succeeds, fails terminally, or the attempt budget
    /// is exhausted.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retriable() => return Err(err),
                Err(err) => err,
            };

            if attempt >= self.max_attempts {
                return Err(StorageError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self
                .base_delay
                .saturating_mul(1 << (attempt - 1))
                .min(self.max_delay);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = &err as &dyn std::error::Error,
                "storage operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
