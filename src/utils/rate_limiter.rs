use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{sleep, Duration, Instant};

/// RateLimiter serialises requests to one provider and enforces a minimum
/// delay between the end of one request and the start of the next
#[derive(Clone)]
pub struct RateLimiter {
    min_delay: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        RateLimiter {
            min_delay,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Wait for our turn. The returned guard keeps other callers out until it
    /// is dropped, then stamps the finish time
    pub async fn acquire(&self) -> RateLimitGuard {
        let last_request = self.last_request.clone().lock_owned().await;
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                sleep(wait_time).await;
            }
        }

        RateLimitGuard { slot: last_request }
    }
}

/// Guard that releases the limiter when dropped
pub struct RateLimitGuard {
    slot: OwnedMutexGuard<Option<Instant>>,
}

impl Drop for RateLimitGuard {
    fn drop(&mut self) {
        *self.slot = Some(Instant::now());
        tracing::trace!("Rate limit slot released");
    }
}
