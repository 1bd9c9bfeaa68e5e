//! SOCKS5 session negotiator
//!
//! Drives one accepted connection through the handshake:
//!
//! 1. Method negotiation ("no authentication" is always selected)
//! 2. Connect command parsing
//! 3. Upstream dial, retried only while the failure is transient
//! 4. Connect reply
//! 5. Relay, when the reply was SUCCEEDED
//!
//! Any codec failure aborts the session with a [`SessionError`] and the
//! connection is dropped. A rejected request is answered with its reply
//! code and the client connection is shut down without relaying.

use super::consts::*;
use super::dial::Dialer;
use super::relay::{relay, RelayReport};
use super::types::{
    AuthNegotiation, AuthRequest, ConnectReply, ConnectRequest, Endpoint, SocksCommand,
};
use crate::config::ServerConfig;
use crate::error::{classify, DialError, ReplyCode, SessionError, Socks5Error};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Position of a session in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, nothing read yet
    Start,
    /// Reading the method selection request
    AwaitAuth,
    /// Method selection reply written
    AuthReplySent,
    /// Reading the connect command
    AwaitConnectCmd,
    /// Opening the upstream connection
    Dialing,
    /// Connect reply written
    ReplySent,
    /// Relaying between client and upstream
    Relaying,
    /// Both connections closed
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Start => "starting",
            SessionState::AwaitAuth => "awaiting auth request",
            SessionState::AuthReplySent => "auth reply sent",
            SessionState::AwaitConnectCmd => "awaiting connect command",
            SessionState::Dialing => "dialing",
            SessionState::ReplySent => "connect reply sent",
            SessionState::Relaying => "relaying",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

fn abort(state: SessionState) -> impl FnOnce(Socks5Error) -> SessionError {
    move |source| SessionError { state, source }
}

/// Handshake read that gives up as soon as the session is cancelled
async fn read_or_cancel<T, F>(cancel: &CancellationToken, read: F) -> Result<T, Socks5Error>
where
    F: Future<Output = Result<T, Socks5Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Socks5Error::Cancelled),
        result = read => result,
    }
}

/// Result of a successful handshake
#[derive(Debug)]
pub enum Negotiated<S, U> {
    /// SUCCEEDED was sent; the session is ready to relay
    Established(Session<S, U>),
    /// A failure reply was sent and the client connection was shut down
    Rejected(ReplyCode),
}

/// An established client/upstream pairing
#[derive(Debug)]
pub struct Session<S, U> {
    client: S,
    upstream: U,
    target: Endpoint,
    bound: Endpoint,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
    state: SessionState,
}

impl<S, U> Session<S, U>
where
    S: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    /// Destination requested by the client
    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    /// Bound endpoint reported in the reply
    pub fn bound(&self) -> &Endpoint {
        &self.bound
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Token that stops the relay when cancelled
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Relay until both directions have stopped, then close both connections
    pub async fn relay(mut self) -> RelayReport {
        self.state = SessionState::Relaying;
        trace!("Session state: {}", self.state);

        let report = relay(
            self.client,
            self.upstream,
            &self.config.client_to_upstream(),
            &self.config.upstream_to_client(),
            self.cancel,
        )
        .await;

        trace!("Session state: {}", SessionState::Closed);
        report
    }
}

/// Server-side handshake driver, one shared instance for all sessions
#[derive(Debug)]
pub struct Negotiator<D: Dialer> {
    config: Arc<ServerConfig>,
    dialer: Arc<D>,
}

impl<D: Dialer> Clone for Negotiator<D> {
    fn clone(&self) -> Self {
        Negotiator {
            config: self.config.clone(),
            dialer: self.dialer.clone(),
        }
    }
}

impl<D: Dialer> Negotiator<D> {
    /// Create a negotiator
    pub fn new(config: Arc<ServerConfig>, dialer: Arc<D>) -> Self {
        Negotiator { config, dialer }
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the handshake on `client`.
    ///
    /// `cancel` is the session token; it aborts the handshake reads and
    /// dialing, and later stops the relay.
    pub async fn negotiate<S>(
        &self,
        mut client: S,
        cancel: CancellationToken,
    ) -> Result<Negotiated<S, D::Stream>, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut state = SessionState::AwaitAuth;
        trace!("Session state: {}", state);

        let request = read_or_cancel(&cancel, AuthRequest::read_from(&mut client))
            .await
            .map_err(abort(state))?;
        if request.version != SOCKS5_VERSION {
            return Err(abort(state)(Socks5Error::UnsupportedVersion(request.version)));
        }

        let negotiation = AuthNegotiation::from_request(request);
        if !negotiation.client_offered_selection() {
            debug!(
                "Client offered {:?}, selecting no authentication anyway",
                negotiation.offered_methods
            );
        }
        negotiation
            .reply()
            .write_to(&mut client)
            .await
            .map_err(abort(state))?;
        state = SessionState::AuthReplySent;
        trace!("Session state: {}", state);

        state = SessionState::AwaitConnectCmd;
        let read = read_or_cancel(&cancel, ConnectRequest::read_from(&mut client)).await;
        let request = match read {
            Ok(request) => request,
            Err(Socks5Error::CommandNotSupported(cmd)) => {
                warn!("Unknown command byte {:#04x}", cmd);
                return self.reject(client, ReplyCode::CommandNotSupported, state).await;
            }
            Err(Socks5Error::AddressTypeNotSupported(atyp)) => {
                warn!("Unknown address type {:#04x}", atyp);
                return self
                    .reject(client, ReplyCode::AddressTypeNotSupported, state)
                    .await;
            }
            Err(e) => return Err(abort(state)(e)),
        };
        if request.version != SOCKS5_VERSION {
            return Err(abort(state)(Socks5Error::UnsupportedVersion(request.version)));
        }

        info!("SOCKS5 {} request to {}", request.command, request.target);

        if request.command != SocksCommand::Connect {
            warn!("{} command not supported", request.command);
            return self.reject(client, ReplyCode::CommandNotSupported, state).await;
        }

        state = SessionState::Dialing;
        trace!("Session state: {}", state);
        let upstream = match self.dial_upstream(&request.target, &cancel).await {
            Ok(upstream) => upstream,
            Err(e) => {
                let reply = classify(&e);
                warn!("Failed to connect to {}: {} (reply {})", request.target, e, reply);
                return self.reject(client, reply, state).await;
            }
        };

        let bound = D::bound_addr(&upstream)
            .map(Endpoint::from)
            .unwrap_or_default();
        ConnectReply::new(ReplyCode::Succeeded, bound.clone())
            .write_to(&mut client)
            .await
            .map_err(abort(state))?;
        state = SessionState::ReplySent;
        trace!("Session state: {}", state);

        info!("SOCKS5 tunnel established to {}", request.target);

        Ok(Negotiated::Established(Session {
            client,
            upstream,
            target: request.target,
            bound,
            config: self.config.clone(),
            cancel,
            state,
        }))
    }

    /// Negotiate and, when established, relay until the session ends.
    ///
    /// Returns `None` when the request was rejected.
    pub async fn serve<S>(
        &self,
        client: S,
        cancel: CancellationToken,
    ) -> Result<Option<RelayReport>, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match self.negotiate(client, cancel).await? {
            Negotiated::Established(session) => Ok(Some(session.relay().await)),
            Negotiated::Rejected(reply) => {
                debug!("Session rejected with {}", reply);
                Ok(None)
            }
        }
    }

    async fn reject<S>(
        &self,
        mut client: S,
        reply: ReplyCode,
        state: SessionState,
    ) -> Result<Negotiated<S, D::Stream>, SessionError>
    where
        S: AsyncWrite + Unpin,
    {
        ConnectReply::without_bound(reply)
            .write_to(&mut client)
            .await
            .map_err(abort(state))?;
        trace!("Session state: {}", SessionState::ReplySent);

        if let Err(e) = client.shutdown().await {
            trace!("Client shutdown: {}", e);
        }
        Ok(Negotiated::Rejected(reply))
    }

    async fn dial_upstream(
        &self,
        target: &Endpoint,
        cancel: &CancellationToken,
    ) -> Result<D::Stream, DialError> {
        let retry = self.config.dial.retry();
        let timeout = self.config.dial.timeout();
        let mut attempt = 0;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DialError::Cancelled),
                result = tokio::time::timeout(timeout, self.dialer.dial(target)) => {
                    result.unwrap_or_else(|_| Err(DialError::Timeout(timeout)))
                }
            };

            match result {
                Ok(upstream) => return Ok(upstream),
                Err(e) if e.is_transient() && retry.should_retry(attempt) => {
                    attempt += 1;
                    warn!(
                        "Transient failure connecting to {}: {}, retry {}/{} in {:?}",
                        target, e, attempt, retry.max_retries, retry.delay
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(DialError::Cancelled),
                        _ = tokio::time::sleep(retry.delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
