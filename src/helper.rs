//! Helper utilities for socks5-relay
//!
//! Duration conversion for millisecond settings and the retry policy used
//! when an upstream dial fails transiently.

use std::time::Duration;

/// Convert a millisecond setting where 0 means "no bound"
pub fn optional_millis(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

/// Fixed-backoff retry policy
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Delay before each retry
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::fixed(3, Duration::from_secs(1))
    }
}

impl RetryConfig {
    /// At most `max_retries` retries, `delay` apart
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        RetryConfig { max_retries, delay }
    }

    /// Whether another attempt is allowed after `attempt` retries
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}
