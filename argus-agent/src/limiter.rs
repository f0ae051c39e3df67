use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;

/// Fixed-rate token bucket used to pace outbound report requests.
///
/// One token is restored per refill interval up to `burst` tokens. Acquiring
/// is an explicit asynchronous wait; callers that need cancellation race the
/// wait against their shutdown signal in a `select!`.
#[derive(Debug)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
}

impl RateLimiter {
    /// Creates a limiter with the given burst size, refilling one token per
    /// `refill_interval`.
    ///
    /// Must be called from within a tokio runtime; the refill task exits on
    /// its own once the limiter is dropped.
    pub fn new(burst: u32, refill_interval: Duration) -> Self {
        let burst = burst.max(1) as usize;
        let permits = Arc::new(Semaphore::new(burst));

        // The refill task holds only a weak reference, so dropping the
        // limiter stops it.
        let weak = Arc::downgrade(&permits);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(refill_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the first
            // refill happens a full interval after startup.
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(permits) = weak.upgrade() else {
                    break;
                };
                if permits.available_permits() < burst {
                    permits.add_permits(1);
                }
            }
        });

        Self { permits }
    }

    /// Waits until a token is available and consumes it.
    pub async fn acquire(&self) {
        // The semaphore is never closed while `self` is alive.
        match self.permits.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => unreachable!("rate limiter semaphore closed"),
        }
    }

    #[cfg(test)]
    fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
