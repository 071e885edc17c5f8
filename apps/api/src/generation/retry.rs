//! Retry policy for provider calls: a fixed attempt budget with doubling backoff.

use std::time::Duration;

/// Exponential backoff without jitter: the delay before attempt `n + 1` is
/// `base_delay * 2^(n - 1)`, so the default schedule is 1s, 2s, 4s, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first one. 1 = no retry.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Caps exponential growth.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt `failed_attempt` (1-based) before the next one.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}
