use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

/// Why a single attempt failed in a way worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    /// HTTP 429.
    RateLimited,
    /// Transport failure or any other non-success status.
    Transient,
}

/// Upper bound on a single backoff wait.
pub const MAX_DELAY: Duration = Duration::from_secs(60 * 60);

const MAX_EXPONENT: u32 = 64;

/// Retry budget for one upstream request.
///
/// Rate-limited attempts wait `base_delay * rate_limit_multiplier^n`, other
/// failures wait `base_delay * transient_multiplier^n`, where `n` counts earlier
/// waits of the same kind. At most `max_attempts` requests are issued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub rate_limit_multiplier: f64,
    pub transient_multiplier: f64,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            rate_limit_multiplier: 2.0,
            transient_multiplier: 1.5,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Never longer than [`MAX_DELAY`], however many waits came before.
    pub fn delay(&self, kind: RetryKind, previous_waits: u32) -> Duration {
        let multiplier = match kind {
            RetryKind::RateLimited => self.rate_limit_multiplier,
            RetryKind::Transient => self.transient_multiplier,
        };
        let exponent = previous_waits.min(MAX_EXPONENT) as i32;
        let secs = self.base_delay.as_secs_f64() * multiplier.powi(exponent);
        if secs.is_finite() && secs < MAX_DELAY.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            MAX_DELAY
        }
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers every requested delay.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_delays_double() {
        let policy = RetryPolicy::new(Duration::from_secs(30), 5);
        let delays: Vec<_> = (0..3)
            .map(|n| policy.delay(RetryKind::RateLimited, n))
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(120)
            ]
        );
    }

    #[test]
    fn transient_delays_grow_gently() {
        let policy = RetryPolicy::new(Duration::from_secs(20), 5);
        assert_eq!(policy.delay(RetryKind::Transient, 0), Duration::from_secs(20));
        assert_eq!(policy.delay(RetryKind::Transient, 1), Duration::from_secs(30));
        assert_eq!(policy.delay(RetryKind::Transient, 2), Duration::from_secs(45));
    }

    #[test]
    fn long_retry_budgets_stop_growing_at_the_cap() {
        let policy = RetryPolicy::new(Duration::from_secs(30), 500);
        assert_eq!(policy.delay(RetryKind::RateLimited, 6), Duration::from_secs(1920));
        assert_eq!(policy.delay(RetryKind::RateLimited, 70), MAX_DELAY);
        assert_eq!(policy.delay(RetryKind::Transient, 499), MAX_DELAY);
        assert_eq!(policy.delay(RetryKind::RateLimited, u32::MAX), MAX_DELAY);
    }

    #[test]
    fn at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(Duration::ZERO, 0).max_attempts, 1);
    }
}
