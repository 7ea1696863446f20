use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Longest spacing a very low request rate can produce
pub const MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Spaces request starts evenly, shared by every worker of a client.
///
/// A server-side throttle signal pushes the next free slot out for everyone,
/// not just the request that was rejected.
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / requests_per_second)
                .unwrap_or(MAX_INTERVAL)
                .min(MAX_INTERVAL)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until this caller may start a request
    pub async fn acquire(&self) {
        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = (*next).max(now);
            *next = slot + self.interval;
            slot - now
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Suspend all callers for at least `wait` from now
    pub async fn hold_off(&self, wait: Duration) {
        let mut next = self.next_slot.lock().await;
        let resume = Instant::now() + wait;
        if resume > *next {
            *next = resume;
        }
    }
}

/// Retry budget for one page request
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for server/network failures, first try included
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Used on 429 when the server sends no Retry-After
    pub rate_limit_backoff: Duration,
    pub max_rate_limit_retries: u32,
    /// Upper bound on honoring a server-provided Retry-After
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            rate_limit_backoff: Duration::from_secs(10),
            max_rate_limit_retries: 5,
            max_retry_after: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failures`-th consecutive failure: base * 2^(failures-1), capped
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }

    pub fn rate_limit_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|d| d.min(self.max_retry_after))
            .unwrap_or(self.rate_limit_backoff)
    }
}
