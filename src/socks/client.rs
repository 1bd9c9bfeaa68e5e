//! SOCKS5 client negotiator
//!
//! Speaks the client half of the handshake over any byte stream and turns
//! every non-success reply into a named [`ClientError`].

use super::consts::*;
use super::types::{AuthReply, AuthRequest, ConnectReply, ConnectRequest, Endpoint};
use crate::error::ClientError;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Client side of a SOCKS5 connection
#[derive(Debug)]
pub struct Socks5Client<S> {
    stream: S,
}

impl Socks5Client<TcpStream> {
    /// Open a TCP connection to the proxy at `proxy`
    pub async fn dial<A: ToSocketAddrs>(proxy: A) -> io::Result<Self> {
        let stream = TcpStream::connect(proxy).await?;
        stream.set_nodelay(true)?;
        Ok(Socks5Client::new(stream))
    }
}

impl<S> Socks5Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream
    pub fn new(stream: S) -> Self {
        Socks5Client { stream }
    }

    /// Get a reference to the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Get a mutable reference to the underlying stream
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Consume the client and return the stream, ready to carry tunnel data
    /// after a successful [`connect`](Self::connect)
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Offer a single authentication method and return the one selected
    pub async fn auth(&mut self, method: u8) -> Result<u8, ClientError> {
        AuthRequest::new(vec![method])
            .write_to(&mut self.stream)
            .await?;

        let reply = AuthReply::read_from(&mut self.stream).await?;
        if reply.version != SOCKS5_VERSION {
            return Err(ClientError::VersionMismatch(reply.version));
        }
        if reply.method == SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE {
            return Err(ClientError::MethodRejected);
        }

        debug!("Proxy selected auth method {:#04x}", reply.method);
        Ok(reply.method)
    }

    /// Ask the proxy to connect to `host:port`.
    ///
    /// `host` may be an IPv4 literal, an IPv6 literal or a domain name.
    /// Returns the bound endpoint reported by the proxy.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<Endpoint, ClientError> {
        let target = Endpoint::from_host(host, port)?;
        debug!("Requesting connect to {}", target);

        ConnectRequest::connect(target)
            .write_to(&mut self.stream)
            .await?;

        let reply = ConnectReply::read_from(&mut self.stream).await?;
        if reply.version != SOCKS5_VERSION {
            return Err(ClientError::VersionMismatch(reply.version));
        }
        if let Some(err) = ClientError::from_reply(reply.reply) {
            return Err(err);
        }

        Ok(reply.bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};
    use tokio_test::io::Builder;

    const CONNECT_IPV4: &[u8] = &[5, 1, 0, 1, 93, 184, 216, 34, 0, 80];

    #[tokio::test]
    async fn test_auth_accepted() {
        let mock = Builder::new().write(&[5, 1, 0]).read(&[5, 0]).build();
        let mut client = Socks5Client::new(mock);
        assert_eq!(client.auth(SOCKS5_AUTH_METHOD_NONE).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_auth_method_rejected() {
        let mock = Builder::new().write(&[5, 1, 2]).read(&[5, 0xFF]).build();
        let mut client = Socks5Client::new(mock);
        let err = client.auth(SOCKS5_AUTH_METHOD_PASSWORD).await.unwrap_err();
        assert!(matches!(err, ClientError::MethodRejected));
    }

    #[tokio::test]
    async fn test_auth_version_mismatch() {
        let mock = Builder::new().write(&[5, 1, 0]).read(&[4, 0]).build();
        let mut client = Socks5Client::new(mock);
        let err = client.auth(SOCKS5_AUTH_METHOD_NONE).await.unwrap_err();
        assert!(matches!(err, ClientError::VersionMismatch(4)));
    }

    #[tokio::test]
    async fn test_auth_truncated_reply() {
        let mock = Builder::new().write(&[5, 1, 0]).read(&[5]).build();
        let mut client = Socks5Client::new(mock);
        let err = client.auth(SOCKS5_AUTH_METHOD_NONE).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_connect_success_returns_bound() {
        let mock = Builder::new()
            .write(CONNECT_IPV4)
            .read(&[5, 0, 0, 1, 10, 0, 0, 7, 0x1F, 0x90])
            .build();
        let mut client = Socks5Client::new(mock);

        let bound = client.connect("93.184.216.34", 80).await.unwrap();
        assert_eq!(bound, Endpoint::ipv4(Ipv4Addr::new(10, 0, 0, 7), 8080));
    }

    #[tokio::test]
    async fn test_connect_domain_target() {
        let mut request = vec![5, 1, 0, 3, 11];
        request.extend_from_slice(b"example.com");
        request.extend_from_slice(&[0x01, 0xBB]);

        let mock = Builder::new()
            .write(&request)
            .read(&[5, 0, 0, 1, 0, 0, 0, 0, 0, 0])
            .build();
        let mut client = Socks5Client::new(mock);

        let bound = client.connect("example.com", 443).await.unwrap();
        assert_eq!(bound, Endpoint::unspecified());
    }

    #[tokio::test]
    async fn test_connect_ipv6_target() {
        let mut request = vec![5, 1, 0, 4];
        request.extend_from_slice(&[0u8; 15]);
        request.push(1);
        request.extend_from_slice(&[0x00, 0x16]);

        let mock = Builder::new()
            .write(&request)
            .read(&[5, 0, 0, 1, 0, 0, 0, 0, 0, 0])
            .build();
        let mut client = Socks5Client::new(mock);
        assert!(client.connect("::1", 22).await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_failure_codes_are_named() {
        let cases = [
            (0x01, ReplyCheck::ServerFailure),
            (0x02, ReplyCheck::NotAllowed),
            (0x05, ReplyCheck::Refused),
            (0x06, ReplyCheck::TtlExpired),
            (0x07, ReplyCheck::CommandNotSupported),
        ];

        for (code, expected) in cases {
            let mock = Builder::new()
                .write(CONNECT_IPV4)
                .read(&[5, code, 0, 1, 0, 0, 0, 0, 0, 0])
                .build();
            let mut client = Socks5Client::new(mock);
            let err = client.connect("93.184.216.34", 80).await.unwrap_err();
            assert!(expected.matches(&err), "code {:#04x} gave {:?}", code, err);
            assert_eq!(err.reply_code().map(u8::from), Some(code));
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum ReplyCheck {
        ServerFailure,
        NotAllowed,
        Refused,
        TtlExpired,
        CommandNotSupported,
    }

    impl ReplyCheck {
        fn matches(self, err: &ClientError) -> bool {
            matches!(
                (self, err),
                (ReplyCheck::ServerFailure, ClientError::ServerFailure)
                    | (ReplyCheck::NotAllowed, ClientError::RemoteConnectionNotAllowed)
                    | (ReplyCheck::Refused, ClientError::RemoteConnectionRefused)
                    | (ReplyCheck::TtlExpired, ClientError::RemoteTtlExpired)
                    | (ReplyCheck::CommandNotSupported, ClientError::CommandNotSupported)
            )
        }
    }

    #[tokio::test]
    async fn test_connect_version_mismatch() {
        let mock = Builder::new()
            .write(CONNECT_IPV4)
            .read(&[4, 0, 0, 1, 0, 0, 0, 0, 0, 0])
            .build();
        let mut client = Socks5Client::new(mock);
        let err = client.connect("93.184.216.34", 80).await.unwrap_err();
        assert!(matches!(err, ClientError::VersionMismatch(4)));
    }

    #[tokio::test]
    async fn test_connect_rejects_oversized_domain() {
        let mock = Builder::new().build();
        let mut client = Socks5Client::new(mock);
        let host = "a".repeat(300);
        let err = client.connect(&host, 80).await.unwrap_err();
        assert!(err.reply_code().is_none());
    }

    #[tokio::test]
    async fn test_dial_and_into_inner() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();

        let (client, accepted) = tokio::join!(Socks5Client::dial(addr), listener.accept());
        let client = client.unwrap();
        let (_server, peer) = accepted.unwrap();
        assert_eq!(client.get_ref().local_addr().unwrap(), peer);
        assert_eq!(client.into_inner().peer_addr().unwrap(), addr);
    }
}
