use std::time::Duration;

/// Bounded exponential backoff for idempotent gateway calls.
///
/// Only the token exchange is retried this way. Push submissions are not
/// idempotent on the gateway side and are never replayed by this policy.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    max_attempts: u32,

    base_delay_ms: u64,

    max_delay_ms: u64,
}

impl RetryStrategy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: 5_000,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after `failed_attempts` failures, or `None` when the
    /// budget is spent.
    pub fn delay_after(&self, failed_attempts: u32) -> Option<Duration> {
        if failed_attempts == 0 || failed_attempts >= self.max_attempts {
            return None;
        }

        // 1st retry waits base, then 2x, 4x...
        let multiplier = 2_u64.saturating_pow(failed_attempts - 1);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);

        Some(Duration::from_millis(delay_ms))
    }

    /// Whether an HTTP status from the token endpoint is worth another try.
    pub fn is_retryable_status(status_code: u16) -> bool {
        matches!(status_code, 408 | 429 | 500..=599)
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(3, 200)
    }
}
