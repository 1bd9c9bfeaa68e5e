//! Error types for socks5-relay
//!
//! This module defines the error taxonomy of the proxy engine and the
//! classifier that turns a dial failure into a SOCKS5 reply code.

use crate::socks::{
    SessionState, SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED, SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
    SOCKS5_REPLY_CONNECTION_NOT_ALLOWED, SOCKS5_REPLY_CONNECTION_REFUSED,
    SOCKS5_REPLY_GENERAL_FAILURE, SOCKS5_REPLY_HOST_UNREACHABLE, SOCKS5_REPLY_NETWORK_UNREACHABLE,
    SOCKS5_REPLY_SUCCEEDED, SOCKS5_REPLY_TTL_EXPIRED, SOCKS5_REPLY_UNASSIGNED,
};
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for library operations outside a single session
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// SOCKS5 protocol error
    #[error("SOCKS5 error: {0}")]
    Socks5(#[from] Socks5Error),
}

/// Wire-level SOCKS5 errors (malformed or truncated frames)
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Underlying stream failed, including short reads
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Command byte outside CONNECT/BIND/UDP ASSOCIATE
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Domain name does not fit the one-byte length prefix
    #[error("Domain name too long: {0} bytes")]
    DomainTooLong(usize),

    /// Domain name bytes are not valid UTF-8
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Method list does not fit the one-byte count
    #[error("Too many authentication methods: {0}")]
    TooManyMethods(usize),

    /// Reply byte outside the defined reply codes
    #[error("Invalid reply code: {0}")]
    InvalidReplyCode(u8),

    /// Read abandoned because the session was cancelled
    #[error("Cancelled")]
    Cancelled,
}

/// A server-side session aborted by a codec failure
#[derive(Error, Debug)]
#[error("session aborted while {state}: {source}")]
pub struct SessionError {
    /// State the negotiator was in when the failure happened
    pub state: SessionState,
    /// The codec failure
    #[source]
    pub source: Socks5Error,
}

/// Failure to open the upstream connection
#[derive(Error, Debug)]
pub enum DialError {
    /// Domain name resolution failed
    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        /// Name that failed to resolve
        host: String,
        /// Resolver error
        #[source]
        source: io::Error,
    },

    /// Resolution succeeded but returned nothing
    #[error("No addresses found for {0}")]
    NoAddress(String),

    /// A single connect attempt exceeded its timeout
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    /// Session was cancelled while dialing
    #[error("Dial cancelled")]
    Cancelled,

    /// Transport error from the connect call
    #[error("Connect failed: {0}")]
    Io(#[from] io::Error),
}

impl DialError {
    /// Whether a retry can be expected to succeed.
    ///
    /// Only momentary conditions qualify. Timeouts and refusals are
    /// terminal and get reported through a reply code instead.
    pub fn is_transient(&self) -> bool {
        match self {
            DialError::Io(err) => {
                matches!(
                    err.kind(),
                    io::ErrorKind::Interrupted
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::ResourceBusy
                ) || is_resource_exhausted(err)
            }
            _ => false,
        }
    }

    /// Reply code reported to the client for this failure
    pub fn reply_code(&self) -> ReplyCode {
        ReplyCode::from(self)
    }
}

/// Out of descriptors or socket buffers; these carry no `ErrorKind` of their own
#[cfg(unix)]
fn is_resource_exhausted(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS)
    )
}

#[cfg(not(unix))]
fn is_resource_exhausted(_err: &io::Error) -> bool {
    false
}

/// Client-side handshake outcomes other than success
#[derive(Error, Debug)]
pub enum ClientError {
    /// Malformed or truncated frame, or a failed stream
    #[error("Protocol error: {0}")]
    Protocol(#[from] Socks5Error),

    /// Server answered with a version other than 5
    #[error("Socks version not supported: {0}")]
    VersionMismatch(u8),

    /// Server accepted none of the offered methods
    #[error("No acceptable authentication method")]
    MethodRejected,

    /// Reply 0x01
    #[error("Socks server failure")]
    ServerFailure,

    /// Reply 0x02
    #[error("Remote connection not allowed")]
    RemoteConnectionNotAllowed,

    /// Reply 0x03
    #[error("Remote network unreachable")]
    RemoteNetworkUnreachable,

    /// Reply 0x04
    #[error("Remote host unreachable")]
    RemoteHostUnreachable,

    /// Reply 0x05
    #[error("Remote connection refused")]
    RemoteConnectionRefused,

    /// Reply 0x06
    #[error("Remote TTL expired")]
    RemoteTtlExpired,

    /// Reply 0x07
    #[error("Command not supported")]
    CommandNotSupported,

    /// Reply 0x08
    #[error("Address type not supported")]
    AddressTypeNotSupported,

    /// Reply 0x09
    #[error("Unassigned reply code")]
    Unassigned,
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        ClientError::Protocol(Socks5Error::Io(err))
    }
}

impl ClientError {
    /// Map a reply code to its named error; `None` for SUCCEEDED
    pub fn from_reply(code: ReplyCode) -> Option<Self> {
        match code {
            ReplyCode::Succeeded => None,
            ReplyCode::GeneralFailure => Some(ClientError::ServerFailure),
            ReplyCode::ConnectionNotAllowed => Some(ClientError::RemoteConnectionNotAllowed),
            ReplyCode::NetworkUnreachable => Some(ClientError::RemoteNetworkUnreachable),
            ReplyCode::HostUnreachable => Some(ClientError::RemoteHostUnreachable),
            ReplyCode::ConnectionRefused => Some(ClientError::RemoteConnectionRefused),
            ReplyCode::TtlExpired => Some(ClientError::RemoteTtlExpired),
            ReplyCode::CommandNotSupported => Some(ClientError::CommandNotSupported),
            ReplyCode::AddressTypeNotSupported => Some(ClientError::AddressTypeNotSupported),
            ReplyCode::Unassigned => Some(ClientError::Unassigned),
        }
    }

    /// Reply code this error was created from, if any
    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            ClientError::ServerFailure => Some(ReplyCode::GeneralFailure),
            ClientError::RemoteConnectionNotAllowed => Some(ReplyCode::ConnectionNotAllowed),
            ClientError::RemoteNetworkUnreachable => Some(ReplyCode::NetworkUnreachable),
            ClientError::RemoteHostUnreachable => Some(ReplyCode::HostUnreachable),
            ClientError::RemoteConnectionRefused => Some(ReplyCode::ConnectionRefused),
            ClientError::RemoteTtlExpired => Some(ReplyCode::TtlExpired),
            ClientError::CommandNotSupported => Some(ReplyCode::CommandNotSupported),
            ClientError::AddressTypeNotSupported => Some(ReplyCode::AddressTypeNotSupported),
            ClientError::Unassigned => Some(ReplyCode::Unassigned),
            ClientError::Protocol(_)
            | ClientError::VersionMismatch(_)
            | ClientError::MethodRejected => None,
        }
    }
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReplyCode {
    /// Command succeeded
    Succeeded = SOCKS5_REPLY_SUCCEEDED,
    /// General SOCKS server failure
    GeneralFailure = SOCKS5_REPLY_GENERAL_FAILURE,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = SOCKS5_REPLY_CONNECTION_NOT_ALLOWED,
    /// Network unreachable
    NetworkUnreachable = SOCKS5_REPLY_NETWORK_UNREACHABLE,
    /// Host unreachable
    HostUnreachable = SOCKS5_REPLY_HOST_UNREACHABLE,
    /// Connection refused
    ConnectionRefused = SOCKS5_REPLY_CONNECTION_REFUSED,
    /// TTL expired
    TtlExpired = SOCKS5_REPLY_TTL_EXPIRED,
    /// Command not supported
    CommandNotSupported = SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
    /// Address type not supported
    AddressTypeNotSupported = SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
    /// Reserved, never produced by this server
    Unassigned = SOCKS5_REPLY_UNASSIGNED,
}

impl ReplyCode {
    /// Whether this is the SUCCEEDED code
    pub fn is_success(self) -> bool {
        self == ReplyCode::Succeeded
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplyCode::Succeeded => "succeeded",
            ReplyCode::GeneralFailure => "general SOCKS server failure",
            ReplyCode::ConnectionNotAllowed => "connection not allowed",
            ReplyCode::NetworkUnreachable => "network unreachable",
            ReplyCode::HostUnreachable => "host unreachable",
            ReplyCode::ConnectionRefused => "connection refused",
            ReplyCode::TtlExpired => "TTL expired",
            ReplyCode::CommandNotSupported => "command not supported",
            ReplyCode::AddressTypeNotSupported => "address type not supported",
            ReplyCode::Unassigned => "unassigned",
        };
        write!(f, "{} (0x{:02x})", name, *self as u8)
    }
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = Socks5Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            SOCKS5_REPLY_SUCCEEDED => Ok(ReplyCode::Succeeded),
            SOCKS5_REPLY_GENERAL_FAILURE => Ok(ReplyCode::GeneralFailure),
            SOCKS5_REPLY_CONNECTION_NOT_ALLOWED => Ok(ReplyCode::ConnectionNotAllowed),
            SOCKS5_REPLY_NETWORK_UNREACHABLE => Ok(ReplyCode::NetworkUnreachable),
            SOCKS5_REPLY_HOST_UNREACHABLE => Ok(ReplyCode::HostUnreachable),
            SOCKS5_REPLY_CONNECTION_REFUSED => Ok(ReplyCode::ConnectionRefused),
            SOCKS5_REPLY_TTL_EXPIRED => Ok(ReplyCode::TtlExpired),
            SOCKS5_REPLY_COMMAND_NOT_SUPPORTED => Ok(ReplyCode::CommandNotSupported),
            SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED => Ok(ReplyCode::AddressTypeNotSupported),
            SOCKS5_REPLY_UNASSIGNED => Ok(ReplyCode::Unassigned),
            other => Err(Socks5Error::InvalidReplyCode(other)),
        }
    }
}

impl From<&io::Error> for ReplyCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => ReplyCode::TtlExpired,
            io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => ReplyCode::NetworkUnreachable,
            io::ErrorKind::HostUnreachable => ReplyCode::HostUnreachable,
            io::ErrorKind::NotConnected | io::ErrorKind::PermissionDenied => {
                ReplyCode::ConnectionNotAllowed
            }
            io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::Unsupported => ReplyCode::AddressTypeNotSupported,
            _ => ReplyCode::GeneralFailure,
        }
    }
}

impl From<&DialError> for ReplyCode {
    fn from(err: &DialError) -> Self {
        classify(err)
    }
}

/// Map a dial failure onto the reply code sent to the client.
///
/// Total: causes with no dedicated code yield `GeneralFailure`, and
/// `Unassigned` is never produced.
pub fn classify(err: &DialError) -> ReplyCode {
    match err {
        DialError::Timeout(_) => ReplyCode::TtlExpired,
        DialError::Resolve { .. } | DialError::NoAddress(_) => {
            ReplyCode::AddressTypeNotSupported
        }
        DialError::Cancelled => ReplyCode::GeneralFailure,
        DialError::Io(io_err) => ReplyCode::from(io_err),
    }
}
