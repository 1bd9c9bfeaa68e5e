//! SOCKS5 type definitions
//!
//! The address model (`Endpoint`, `AddrKind`) and the four handshake
//! messages exchanged before relaying starts.

use super::consts::*;
use crate::error::{ReplyCode, Socks5Error};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Address encoding of an endpoint, as carried by the ATYP byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrKind {
    /// 4-byte IPv4 address
    Ipv4,
    /// 16-byte IPv6 address
    Ipv6,
    /// Length-prefixed domain name
    Domain,
}

impl AddrKind {
    /// Classify a host literal.
    ///
    /// IP literals become `Ipv4` when they fit in 4 bytes (this includes
    /// IPv4-mapped IPv6 literals such as `::ffff:10.0.0.1`), `Ipv6`
    /// otherwise. Anything that does not parse as an IP is a domain name.
    pub fn classify(literal: &str) -> Self {
        match literal.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => AddrKind::Ipv4,
            Ok(IpAddr::V6(v6)) if v6.to_ipv4_mapped().is_some() => AddrKind::Ipv4,
            Ok(IpAddr::V6(_)) => AddrKind::Ipv6,
            Err(_) => AddrKind::Domain,
        }
    }

    /// ATYP byte for this kind
    pub fn to_byte(self) -> u8 {
        match self {
            AddrKind::Ipv4 => SOCKS5_ADDR_TYPE_IPV4,
            AddrKind::Ipv6 => SOCKS5_ADDR_TYPE_IPV6,
            AddrKind::Domain => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }

    /// Parse an ATYP byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_ADDR_TYPE_IPV4 => Some(AddrKind::Ipv4),
            SOCKS5_ADDR_TYPE_IPV6 => Some(AddrKind::Ipv6),
            SOCKS5_ADDR_TYPE_DOMAIN => Some(AddrKind::Domain),
            _ => None,
        }
    }
}

/// Destination or bound endpoint of a SOCKS5 exchange.
///
/// Domain names are at most [`MAX_DOMAIN_LEN`] bytes; [`Endpoint::domain`]
/// enforces this and the codec refuses to encode a longer one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl Endpoint {
    /// Create an endpoint from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        Endpoint::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create an endpoint from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        Endpoint::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a domain endpoint, rejecting names longer than 255 bytes
    pub fn domain(domain: impl Into<String>, port: u16) -> Result<Self, Socks5Error> {
        let domain = domain.into();
        if domain.len() > MAX_DOMAIN_LEN {
            return Err(Socks5Error::DomainTooLong(domain.len()));
        }
        Ok(Endpoint::Domain(domain, port))
    }

    /// Build an endpoint from a host literal, using [`AddrKind::classify`]
    pub fn from_host(host: &str, port: u16) -> Result<Self, Socks5Error> {
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => Ok(Endpoint::ipv4(v4, port)),
            Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => Ok(Endpoint::ipv4(v4, port)),
                None => Ok(Endpoint::ipv6(v6, port)),
            },
            Err(_) => Endpoint::domain(host, port),
        }
    }

    /// The zero endpoint (`0.0.0.0:0`), used when no bind address exists
    pub fn unspecified() -> Self {
        Endpoint::ipv4(Ipv4Addr::UNSPECIFIED, 0)
    }

    /// Address kind of this endpoint
    pub fn kind(&self) -> AddrKind {
        match self {
            Endpoint::Ip(SocketAddr::V4(_)) => AddrKind::Ipv4,
            Endpoint::Ip(SocketAddr::V6(_)) => AddrKind::Ipv6,
            Endpoint::Domain(_, _) => AddrKind::Domain,
        }
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            Endpoint::Ip(addr) => addr.port(),
            Endpoint::Domain(_, port) => *port,
        }
    }

    /// Host part rendered as a string (no brackets around IPv6)
    pub fn host(&self) -> String {
        match self {
            Endpoint::Ip(addr) => addr.ip().to_string(),
            Endpoint::Domain(domain, _) => domain.clone(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Ip(addr) => write!(f, "{}", addr),
            Endpoint::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
                Some(v4) => Endpoint::ipv4(v4, v6.port()),
                None => Endpoint::ipv6(*v6.ip(), v6.port()),
            },
            v4 => Endpoint::Ip(v4),
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::unspecified()
    }
}

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - recognized, always rejected
    Bind,
    /// UDP ASSOCIATE - recognized, always rejected
    UdpAssociate,
}

impl SocksCommand {
    /// Parse a command byte into SocksCommand
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Some(SocksCommand::Connect),
            SOCKS5_CMD_TCP_BIND => Some(SocksCommand::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Some(SocksCommand::UdpAssociate),
            _ => None,
        }
    }

    /// Convert SocksCommand to byte
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => SOCKS5_CMD_TCP_CONNECT,
            SocksCommand::Bind => SOCKS5_CMD_TCP_BIND,
            SocksCommand::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Method selection request: `VER NMETHODS METHODS...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Protocol version byte as received or to be sent
    pub version: u8,
    /// Offered methods; the count byte is derived from the length
    pub methods: Vec<u8>,
}

impl AuthRequest {
    /// A version-5 request offering `methods`
    pub fn new(methods: Vec<u8>) -> Self {
        AuthRequest {
            version: SOCKS5_VERSION,
            methods,
        }
    }
}

/// Method selection reply: `VER METHOD`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthReply {
    /// Protocol version byte
    pub version: u8,
    /// Selected method
    pub method: u8,
}

impl AuthReply {
    /// A version-5 reply selecting `method`
    pub fn new(method: u8) -> Self {
        AuthReply {
            version: SOCKS5_VERSION,
            method,
        }
    }
}

/// Server-side record of one method negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthNegotiation {
    /// Version byte the client sent
    pub version: u8,
    /// Methods the client offered
    pub offered_methods: Vec<u8>,
    /// Method the server picked
    pub selected_method: u8,
}

impl AuthNegotiation {
    /// Negotiate against a received request.
    ///
    /// The server only speaks "no authentication" and selects it regardless
    /// of what was offered.
    pub fn from_request(request: AuthRequest) -> Self {
        AuthNegotiation {
            version: request.version,
            offered_methods: request.methods,
            selected_method: SOCKS5_AUTH_METHOD_NONE,
        }
    }

    /// Whether the client actually offered the selected method
    pub fn client_offered_selection(&self) -> bool {
        self.offered_methods.contains(&self.selected_method)
    }

    /// The reply to send back
    pub fn reply(&self) -> AuthReply {
        AuthReply::new(self.selected_method)
    }
}

/// Connect command: `VER CMD RSV ATYP DST.ADDR DST.PORT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Protocol version byte
    pub version: u8,
    /// Requested command
    pub command: SocksCommand,
    /// Destination endpoint
    pub target: Endpoint,
}

impl ConnectRequest {
    /// A version-5 CONNECT to `target`
    pub fn connect(target: Endpoint) -> Self {
        ConnectRequest {
            version: SOCKS5_VERSION,
            command: SocksCommand::Connect,
            target,
        }
    }
}

/// Connect reply: `VER REP RSV ATYP BND.ADDR BND.PORT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReply {
    /// Protocol version byte
    pub version: u8,
    /// Outcome of the request
    pub reply: ReplyCode,
    /// Bound endpoint, the zero endpoint when there is none
    pub bound: Endpoint,
}

impl ConnectReply {
    /// A version-5 reply
    pub fn new(reply: ReplyCode, bound: Endpoint) -> Self {
        ConnectReply {
            version: SOCKS5_VERSION,
            reply,
            bound,
        }
    }

    /// A version-5 reply with the zero bound endpoint
    pub fn without_bound(reply: ReplyCode) -> Self {
        ConnectReply::new(reply, Endpoint::unspecified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_literals() {
        assert_eq!(AddrKind::classify("93.184.216.34"), AddrKind::Ipv4);
        assert_eq!(AddrKind::classify("2001:db8::1"), AddrKind::Ipv6);
        assert_eq!(AddrKind::classify("example.com"), AddrKind::Domain);
    }

    #[test]
    fn test_classify_prefers_ipv4_for_mapped() {
        assert_eq!(AddrKind::classify("::ffff:10.0.0.1"), AddrKind::Ipv4);
        assert_eq!(
            Endpoint::from_host("::ffff:10.0.0.1", 80).unwrap(),
            Endpoint::ipv4(Ipv4Addr::new(10, 0, 0, 1), 80)
        );
    }

    #[test]
    fn test_classify_odd_inputs_are_domains() {
        assert_eq!(AddrKind::classify(""), AddrKind::Domain);
        assert_eq!(AddrKind::classify("256.1.1.1"), AddrKind::Domain);
        assert_eq!(AddrKind::classify("[::1]"), AddrKind::Domain);
        assert_eq!(AddrKind::classify("localhost"), AddrKind::Domain);
    }

    #[test]
    fn test_addr_kind_bytes() {
        for kind in [AddrKind::Ipv4, AddrKind::Ipv6, AddrKind::Domain] {
            assert_eq!(AddrKind::from_byte(kind.to_byte()), Some(kind));
        }
        assert_eq!(AddrKind::from_byte(0x02), None);
    }

    #[test]
    fn test_endpoint_from_host() {
        let ep = Endpoint::from_host("2001:db8::1", 443).unwrap();
        assert_eq!(ep.kind(), AddrKind::Ipv6);
        assert_eq!(ep.port(), 443);

        let ep = Endpoint::from_host("example.com", 80).unwrap();
        assert_eq!(ep, Endpoint::Domain("example.com".to_string(), 80));
        assert_eq!(ep.kind(), AddrKind::Domain);
    }

    #[test]
    fn test_endpoint_domain_length_limit() {
        assert!(Endpoint::domain("a".repeat(255), 1).is_ok());
        assert!(Endpoint::domain("", 1).is_ok());
        assert!(matches!(
            Endpoint::domain("a".repeat(256), 1),
            Err(Socks5Error::DomainTooLong(256))
        ));
    }

    #[test]
    fn test_endpoint_display() {
        let ep = Endpoint::ipv4(Ipv4Addr::new(127, 0, 0, 1), 8080);
        assert_eq!(format!("{}", ep), "127.0.0.1:8080");

        let ep = Endpoint::ipv6(Ipv6Addr::LOCALHOST, 443);
        assert_eq!(format!("{}", ep), "[::1]:443");
        assert_eq!(ep.host(), "::1");

        let ep = Endpoint::Domain("test.com".to_string(), 443);
        assert_eq!(format!("{}", ep), "test.com:443");
    }

    #[test]
    fn test_endpoint_unspecified_is_default() {
        assert_eq!(Endpoint::default(), Endpoint::unspecified());
        assert_eq!(Endpoint::unspecified().port(), 0);
        assert_eq!(Endpoint::unspecified().kind(), AddrKind::Ipv4);
    }

    #[test]
    fn test_endpoint_from_mapped_socket_addr() {
        let addr: SocketAddr = "[::ffff:192.168.1.1]:22".parse().unwrap();
        assert_eq!(
            Endpoint::from(addr),
            Endpoint::ipv4(Ipv4Addr::new(192, 168, 1, 1), 22)
        );
    }

    #[test]
    fn test_socks_command_bytes() {
        assert_eq!(SocksCommand::from_byte(1), Some(SocksCommand::Connect));
        assert_eq!(SocksCommand::from_byte(2), Some(SocksCommand::Bind));
        assert_eq!(SocksCommand::from_byte(3), Some(SocksCommand::UdpAssociate));
        assert_eq!(SocksCommand::from_byte(4), None);
        assert_eq!(SocksCommand::UdpAssociate.to_byte(), 3);
        assert_eq!(format!("{}", SocksCommand::UdpAssociate), "UDP ASSOCIATE");
    }

    #[test]
    fn test_auth_negotiation_always_selects_none() {
        let nego = AuthNegotiation::from_request(AuthRequest::new(vec![
            SOCKS5_AUTH_METHOD_PASSWORD,
        ]));
        assert_eq!(nego.selected_method, SOCKS5_AUTH_METHOD_NONE);
        assert!(!nego.client_offered_selection());
        assert_eq!(nego.reply(), AuthReply::new(SOCKS5_AUTH_METHOD_NONE));

        let nego = AuthNegotiation::from_request(AuthRequest::new(vec![
            SOCKS5_AUTH_METHOD_NONE,
            SOCKS5_AUTH_METHOD_PASSWORD,
        ]));
        assert!(nego.client_offered_selection());
    }
}
