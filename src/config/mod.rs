//! Configuration module for socks5-relay
//!
//! This module provides configuration types and TOML parsing for the server.

mod server;
mod upstream;

pub use server::{
    Config, ServerConfig, DEFAULT_LISTEN_ADDR, DEFAULT_LOOP_PAUSE_MS,
    DEFAULT_REMOTE_READ_DEADLINE_MS, DEFAULT_REMOTE_TO_SOCKS_BUF_LEN,
    DEFAULT_REMOTE_WRITE_DEADLINE_MS, DEFAULT_SOCKS_READ_DEADLINE_MS,
    DEFAULT_SOCKS_TO_REMOTE_BUF_LEN, DEFAULT_SOCKS_WRITE_DEADLINE_MS,
};
pub use upstream::{
    DialConfig, TcpConfig, DEFAULT_DIAL_BACKOFF_MS, DEFAULT_DIAL_MAX_RETRIES,
    DEFAULT_DIAL_TIMEOUT_MS,
};

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string.
///
/// The returned server configuration is already normalized and validated.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config.server = config.server.normalized();
    config
        .server
        .validate()
        .with_context(|| "Invalid server configuration")?;
    Ok(config)
}
