//! Proxy server
//!
//! Accepts TCP clients and runs one negotiator task per connection until a
//! shutdown signal arrives. Every session gets a child of the server's
//! cancellation token, so stopping the server stops all relays.

use crate::config::{Config, ServerConfig};
use crate::socks::{Dialer, Negotiator, TcpDialer};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Pause after a failed accept, e.g. when the process is out of descriptors
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// SOCKS5 proxy server
#[derive(Debug)]
pub struct Server<D: Dialer> {
    listener: TcpListener,
    negotiator: Negotiator<D>,
}

impl Server<TcpDialer> {
    /// Bind a server that dials upstreams over plain TCP
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let dialer = TcpDialer::from_tcp_config(&config.dial.tcp);
        Server::with_dialer(config, dialer).await
    }
}

impl<D: Dialer> Server<D> {
    /// Bind a server that opens upstream connections with `dialer`
    pub async fn with_dialer(config: ServerConfig, dialer: D) -> Result<Self> {
        let config = config.normalized();
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

        Ok(Server {
            listener,
            negotiator: Negotiator::new(Arc::new(config), Arc::new(dialer)),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &ServerConfig {
        self.negotiator.config()
    }

    /// Run the accept loop until shutdown
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        let root = CancellationToken::new();
        info!("Listening for SOCKS5 clients on {}", self.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_session(stream, peer, root.child_token()),
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        root.cancel();
        info!("Server stopped");
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
        debug!("Accepted connection from {}", peer);
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let negotiator = self.negotiator.clone();
        let span = info_span!("session", %peer);

        tokio::spawn(
            async move {
                match negotiator.serve(stream, cancel).await {
                    Ok(Some(report)) => {
                        if report.has_error() {
                            debug!("Relay ended with an I/O error: {:?}", report);
                        }
                        info!(
                            "Session closed ({} bytes up, {} bytes down)",
                            report.client_to_upstream.bytes, report.upstream_to_client.bytes
                        );
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Session error: {}", e),
                }
            }
            .instrument(span),
        );
    }
}

/// Run a TCP-dialing server with the given configuration
pub async fn run_server(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let server = Server::bind(config.server).await?;
    server.run(shutdown_rx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::bind(ServerConfig::new("127.0.0.1:0")).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert_eq!(server.config().socks_read_deadline_ms, 2000);
    }

    #[tokio::test]
    async fn test_bind_invalid_address() {
        assert!(Server::bind(ServerConfig::new("nowhere")).await.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let server = Server::bind(ServerConfig::new("127.0.0.1:0")).await.unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(server.run(shutdown_rx));
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
