//! Server configuration types
//!
//! Defines the root configuration and the proxy server settings. Every
//! numeric field left at zero is replaced with its documented default by
//! [`ServerConfig::normalized`].

use super::DialConfig;
use crate::error::ProxyError;
use crate::helper::optional_millis;
use crate::socks::PumpConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9000";
/// Default read deadline on the client connection (ms)
pub const DEFAULT_SOCKS_READ_DEADLINE_MS: u64 = 2000;
/// Default write deadline on the client connection (ms, 0 = unbounded)
pub const DEFAULT_SOCKS_WRITE_DEADLINE_MS: u64 = 0;
/// Default read deadline on the upstream connection (ms)
pub const DEFAULT_REMOTE_READ_DEADLINE_MS: u64 = 5000;
/// Default write deadline on the upstream connection (ms, 0 = unbounded)
pub const DEFAULT_REMOTE_WRITE_DEADLINE_MS: u64 = 0;
/// Default client to upstream buffer length
pub const DEFAULT_SOCKS_TO_REMOTE_BUF_LEN: usize = 1024;
/// Default upstream to client buffer length
pub const DEFAULT_REMOTE_TO_SOCKS_BUF_LEN: usize = 4096;
/// Default pause between relay iterations (ms)
pub const DEFAULT_LOOP_PAUSE_MS: u64 = 1;

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Proxy server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Proxy server configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to accept SOCKS5 clients on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Read deadline on the client connection in milliseconds
    #[serde(default)]
    pub socks_read_deadline_ms: u64,

    /// Write deadline on the client connection in milliseconds
    #[serde(default)]
    pub socks_write_deadline_ms: u64,

    /// Read deadline on the upstream connection in milliseconds
    #[serde(default)]
    pub remote_read_deadline_ms: u64,

    /// Write deadline on the upstream connection in milliseconds
    #[serde(default)]
    pub remote_write_deadline_ms: u64,

    /// Buffer length for the client to upstream direction
    #[serde(default)]
    pub socks_to_remote_buf_len: usize,

    /// Buffer length for the upstream to client direction
    #[serde(default)]
    pub remote_to_socks_buf_len: usize,

    /// Pause between relay loop iterations in milliseconds
    #[serde(default)]
    pub loop_pause_ms: u64,

    /// Upstream dial settings
    #[serde(default)]
    pub dial: DialConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: default_listen_addr(),
            socks_read_deadline_ms: DEFAULT_SOCKS_READ_DEADLINE_MS,
            socks_write_deadline_ms: DEFAULT_SOCKS_WRITE_DEADLINE_MS,
            remote_read_deadline_ms: DEFAULT_REMOTE_READ_DEADLINE_MS,
            remote_write_deadline_ms: DEFAULT_REMOTE_WRITE_DEADLINE_MS,
            socks_to_remote_buf_len: DEFAULT_SOCKS_TO_REMOTE_BUF_LEN,
            remote_to_socks_buf_len: DEFAULT_REMOTE_TO_SOCKS_BUF_LEN,
            loop_pause_ms: DEFAULT_LOOP_PAUSE_MS,
            dial: DialConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a configuration listening on `listen_addr` with defaults elsewhere
    pub fn new(listen_addr: impl Into<String>) -> Self {
        ServerConfig {
            listen_addr: listen_addr.into(),
            ..Default::default()
        }
    }

    /// Replace every zero-valued field with its default
    pub fn normalized(mut self) -> Self {
        fn or_default<T: PartialEq + Default>(value: &mut T, default: T) {
            if *value == T::default() {
                *value = default;
            }
        }

        if self.listen_addr.is_empty() {
            self.listen_addr = default_listen_addr();
        }
        or_default(&mut self.socks_read_deadline_ms, DEFAULT_SOCKS_READ_DEADLINE_MS);
        or_default(&mut self.socks_write_deadline_ms, DEFAULT_SOCKS_WRITE_DEADLINE_MS);
        or_default(&mut self.remote_read_deadline_ms, DEFAULT_REMOTE_READ_DEADLINE_MS);
        or_default(&mut self.remote_write_deadline_ms, DEFAULT_REMOTE_WRITE_DEADLINE_MS);
        or_default(&mut self.socks_to_remote_buf_len, DEFAULT_SOCKS_TO_REMOTE_BUF_LEN);
        or_default(&mut self.remote_to_socks_buf_len, DEFAULT_REMOTE_TO_SOCKS_BUF_LEN);
        or_default(&mut self.loop_pause_ms, DEFAULT_LOOP_PAUSE_MS);
        self.dial = self.dial.normalized();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ProxyError> {
        self.listen_addr.parse::<SocketAddr>().map_err(|e| {
            ProxyError::Config(format!("invalid listen_addr {:?}: {}", self.listen_addr, e))
        })?;
        Ok(())
    }

    /// Pause between relay iterations
    pub fn loop_pause(&self) -> Duration {
        Duration::from_millis(self.loop_pause_ms)
    }

    /// Relay settings for the client to upstream direction
    pub fn client_to_upstream(&self) -> PumpConfig {
        PumpConfig {
            read_deadline: optional_millis(self.socks_read_deadline_ms),
            write_deadline: optional_millis(self.remote_write_deadline_ms),
            buf_len: self.socks_to_remote_buf_len,
            pause: self.loop_pause(),
        }
    }

    /// Relay settings for the upstream to client direction
    pub fn upstream_to_client(&self) -> PumpConfig {
        PumpConfig {
            read_deadline: optional_millis(self.remote_read_deadline_ms),
            write_deadline: optional_millis(self.socks_write_deadline_ms),
            buf_len: self.remote_to_socks_buf_len,
            pause: self.loop_pause(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.socks_read_deadline_ms, 2000);
        assert_eq!(config.socks_write_deadline_ms, 0);
        assert_eq!(config.remote_read_deadline_ms, 5000);
        assert_eq!(config.remote_write_deadline_ms, 0);
        assert_eq!(config.socks_to_remote_buf_len, 1024);
        assert_eq!(config.remote_to_socks_buf_len, 4096);
        assert_eq!(config.loop_pause_ms, 1);
    }

    #[test]
    fn test_normalized_fills_zero_fields_only() {
        let config = ServerConfig {
            listen_addr: String::new(),
            socks_read_deadline_ms: 0,
            socks_write_deadline_ms: 0,
            remote_read_deadline_ms: 750,
            remote_write_deadline_ms: 0,
            socks_to_remote_buf_len: 0,
            remote_to_socks_buf_len: 16384,
            loop_pause_ms: 0,
            dial: DialConfig::default(),
        }
        .normalized();

        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.socks_read_deadline_ms, 2000);
        assert_eq!(config.remote_read_deadline_ms, 750);
        assert_eq!(config.socks_to_remote_buf_len, 1024);
        assert_eq!(config.remote_to_socks_buf_len, 16384);
        assert_eq!(config.loop_pause_ms, 1);
    }

    #[test]
    fn test_normalized_is_idempotent() {
        let config = ServerConfig::default().normalized();
        assert_eq!(config.clone().normalized(), config);
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_pump_configs_are_asymmetric() {
        let config = ServerConfig::default();

        let up = config.client_to_upstream();
        assert_eq!(up.read_deadline, Some(Duration::from_millis(2000)));
        assert_eq!(up.write_deadline, None);
        assert_eq!(up.buf_len, 1024);

        let down = config.upstream_to_client();
        assert_eq!(down.read_deadline, Some(Duration::from_millis(5000)));
        assert_eq!(down.write_deadline, None);
        assert_eq!(down.buf_len, 4096);
        assert_eq!(down.pause, Duration::from_millis(1));
    }

    #[test]
    fn test_validate() {
        assert!(ServerConfig::new("127.0.0.1:1080").validate().is_ok());
        assert!(ServerConfig::new("[::1]:1080").validate().is_ok());

        let err = ServerConfig::new("not-an-address").validate().unwrap_err();
        assert!(matches!(err, ProxyError::Config(_)));
    }
}
