//! # socks5-relay - SOCKS5 Proxy Engine
//!
//! socks5-relay accepts SOCKS5 clients, negotiates the handshake, opens the
//! requested upstream TCP connection and relays bytes in both directions
//! until either side disconnects.
//!
//! ## Features
//!
//! - **Wire Codec**: Bit-exact encoding of the method selection and connect
//!   messages for IPv4, IPv6 and domain destinations
//! - **Session Negotiator**: Server-side state machine with bounded upstream
//!   dial retries and a total mapping from dial failures to reply codes
//! - **Client Negotiator**: Client-side handshake with a named error per
//!   reply code
//! - **Relay Engine**: Two concurrent pumps with per-direction deadlines,
//!   buffer sizes and a shared cancellation token
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socks5_relay::config::load_config;
//! use socks5_relay::server::run_server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Server -> Negotiator -> Dialer -> Target
//!                                 \-> Relay <-/
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod helper;
pub mod server;
pub mod socks;

// Re-export commonly used items
pub use config::{load_config, Config, ServerConfig};
pub use error::{
    classify, ClientError, DialError, ProxyError, ReplyCode, SessionError, Socks5Error,
};
pub use server::{run_server, Server};
pub use socks::{Endpoint, Negotiator, Socks5Client};

/// Version of the socks5-relay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
