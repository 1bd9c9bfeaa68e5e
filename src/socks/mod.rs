//! SOCKS5 module for socks5-relay
//!
//! This module implements the SOCKS5 protocol engine: the address model and
//! wire codec, the server-side session negotiator, the client negotiator,
//! upstream dialing and the bidirectional relay.

mod client;
mod codec;
mod consts;
mod dial;
mod handler;
mod relay;
mod types;

pub use client::Socks5Client;
pub use consts::*;
pub use dial::{Dialer, SocketOpts, TcpDialer};
pub use handler::{Negotiated, Negotiator, Session, SessionState};
pub use relay::{relay, PumpConfig, PumpEnd, PumpReport, RelayReport};
pub use types::{
    AddrKind, AuthNegotiation, AuthReply, AuthRequest, ConnectReply, ConnectRequest, Endpoint,
    SocksCommand,
};
