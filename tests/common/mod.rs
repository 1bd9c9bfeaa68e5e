//! Test utilities and mocks for socks5-relay
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use socks5_relay::config::{DialConfig, ServerConfig};
use socks5_relay::error::DialError;
use socks5_relay::socks::{Dialer, Endpoint};
use socks5_relay::Server;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// A loopback address with nothing listening on it
pub async fn refused_addr() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// Server configuration on an ephemeral port with short deadlines
pub fn test_server_config() -> ServerConfig {
    ServerConfig {
        socks_read_deadline_ms: 50,
        remote_read_deadline_ms: 50,
        dial: DialConfig {
            timeout_ms: 1000,
            max_retries: 1,
            backoff_ms: 10,
            ..Default::default()
        },
        ..ServerConfig::new("127.0.0.1:0")
    }
}

/// A running proxy and the handle to stop it
pub struct TestProxy {
    /// Address clients connect to
    pub addr: SocketAddr,
    shutdown_tx: broadcast::Sender<bool>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestProxy {
    /// Start a proxy that dials over TCP
    pub async fn start() -> Self {
        let server = Server::bind(test_server_config()).await.unwrap();
        Self::run(server).await
    }

    /// Start a proxy with a custom dialer
    pub async fn with_dialer<D: Dialer>(dialer: D) -> Self {
        let server = Server::with_dialer(test_server_config(), dialer).await.unwrap();
        Self::run(server).await
    }

    async fn run<D: Dialer>(server: Server<D>) -> Self {
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(server.run(shutdown_rx));
        TestProxy {
            addr,
            shutdown_tx,
            handle,
        }
    }

    /// Stop the accept loop and cancel live sessions
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.await.unwrap().unwrap();
    }
}

/// Dialer that sends every target to one local address and records the
/// requested targets; clones share the record
#[derive(Debug, Clone)]
pub struct LoopbackDialer {
    upstream: SocketAddr,
    targets: Arc<Mutex<Vec<Endpoint>>>,
}

impl LoopbackDialer {
    /// Redirect all dials to `upstream`
    pub fn new(upstream: SocketAddr) -> Self {
        LoopbackDialer {
            upstream,
            targets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Targets requested so far
    pub fn targets(&self) -> Vec<Endpoint> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dialer for LoopbackDialer {
    type Stream = TcpStream;

    async fn dial(&self, target: &Endpoint) -> Result<TcpStream, DialError> {
        self.targets.lock().unwrap().push(target.clone());
        Ok(TcpStream::connect(self.upstream).await?)
    }

    fn bound_addr(conn: &TcpStream) -> Option<SocketAddr> {
        conn.local_addr().ok()
    }
}
