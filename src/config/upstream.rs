//! Upstream connection configuration
//!
//! Dial timeout, bounded retry policy and socket options for the
//! connections the proxy opens towards requested destinations.

use crate::helper::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-attempt connect timeout in milliseconds
pub const DEFAULT_DIAL_TIMEOUT_MS: u64 = 10_000;

/// Default number of retries after a transient dial failure
pub const DEFAULT_DIAL_MAX_RETRIES: u32 = 3;

/// Default fixed backoff between dial retries in milliseconds
pub const DEFAULT_DIAL_BACKOFF_MS: u64 = 1_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_DIAL_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_DIAL_MAX_RETRIES
}

fn default_backoff_ms() -> u64 {
    DEFAULT_DIAL_BACKOFF_MS
}

/// Default keepalive seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default keepalive interval
fn default_keepalive_interval() -> u64 {
    8
}

fn default_nodelay() -> bool {
    true
}

/// Upstream dial configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DialConfig {
    /// Connect timeout per attempt in milliseconds (0 uses the default)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries allowed after a transient failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between retries in milliseconds (0 uses the default)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Socket options applied to upstream connections
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for DialConfig {
    fn default() -> Self {
        DialConfig {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            tcp: TcpConfig::default(),
        }
    }
}

impl DialConfig {
    /// Replace zero durations with their defaults
    pub fn normalized(mut self) -> Self {
        if self.timeout_ms == 0 {
            self.timeout_ms = DEFAULT_DIAL_TIMEOUT_MS;
        }
        if self.backoff_ms == 0 {
            self.backoff_ms = DEFAULT_DIAL_BACKOFF_MS;
        }
        self
    }

    /// Per-attempt connect timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Retry policy for transient failures
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::fixed(self.max_retries, Duration::from_millis(self.backoff_ms))
    }
}

/// TCP socket options for upstream connections
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds (0 disables keepalive)
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}
