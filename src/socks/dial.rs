//! Upstream dialing
//!
//! The negotiator opens upstream connections through the [`Dialer`] trait so
//! tests and embedders can substitute their own transport. [`TcpDialer`] is
//! the stock implementation.

use super::types::Endpoint;
use crate::config::TcpConfig;
use crate::error::DialError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Capability to open a connection to a destination endpoint
#[async_trait]
pub trait Dialer: Debug + Send + Sync + 'static {
    /// The stream type produced by this dialer
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + Debug + 'static;

    /// Open a connection to `target`
    async fn dial(&self, target: &Endpoint) -> Result<Self::Stream, DialError>;

    /// Local address of an established connection, reported to the client
    /// as the bound endpoint
    fn bound_addr(_conn: &Self::Stream) -> Option<SocketAddr> {
        None
    }
}

/// Socket options for upstream connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts::from_tcp_config(&TcpConfig::default())
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        let keepalive = config.keepalive_secs > 0;
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: keepalive.then_some(config.keepalive_secs),
            keepalive_interval: keepalive.then_some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Plain TCP dialer
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    socket_opts: SocketOpts,
}

impl TcpDialer {
    /// Create a dialer applying `socket_opts` to every connection
    pub fn new(socket_opts: SocketOpts) -> Self {
        TcpDialer { socket_opts }
    }

    /// Create a dialer from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        TcpDialer::new(SocketOpts::from_tcp_config(config))
    }

    async fn resolve(target: &Endpoint) -> Result<Vec<SocketAddr>, DialError> {
        match target {
            Endpoint::Ip(addr) => Ok(vec![*addr]),
            Endpoint::Domain(domain, port) => {
                let addrs: Vec<SocketAddr> = tokio::net::lookup_host((domain.as_str(), *port))
                    .await
                    .map_err(|source| DialError::Resolve {
                        host: domain.clone(),
                        source,
                    })?
                    .collect();
                if addrs.is_empty() {
                    return Err(DialError::NoAddress(domain.clone()));
                }
                Ok(addrs)
            }
        }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, target: &Endpoint) -> Result<TcpStream, DialError> {
        let addrs = Self::resolve(target).await?;

        let mut last_err = None;
        for addr in addrs {
            debug!("Connecting to {} ({})", target, addr);
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(e) = self.socket_opts.apply(&stream) {
                        warn!("Failed to apply socket options: {}", e);
                    }
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => DialError::Io(e),
            None => DialError::NoAddress(target.host()),
        })
    }

    fn bound_addr(conn: &TcpStream) -> Option<SocketAddr> {
        conn.local_addr().ok()
    }
}
