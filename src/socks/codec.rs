//! SOCKS5 wire codec
//!
//! Encodes the four handshake messages into a buffer and writes them in one
//! call, and decodes them with exact-length reads. A decode either returns a
//! complete message or an error; short reads surface as
//! [`Socks5Error::Io`]. The codec never checks the version byte, that is up
//! to the caller.
//!
//! ```text
//! AuthRequest:  VER NMETHODS METHODS...
//! AuthReply:    VER METHOD
//! ConnectCmd:   VER CMD RSV ATYP DST.ADDR DST.PORT
//! ConnectReply: VER REP RSV ATYP BND.ADDR BND.PORT
//! ```

use super::consts::*;
use super::types::{
    AddrKind, AuthReply, AuthRequest, ConnectReply, ConnectRequest, Endpoint, SocksCommand,
};
use crate::error::{ReplyCode, Socks5Error};
use bytes::{BufMut, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

type Result<T> = std::result::Result<T, Socks5Error>;

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, buf: &[u8]) -> Result<()> {
    trace!("Write frame {:?}", buf);
    writer.write_all(buf).await?;
    writer.flush().await?;
    Ok(())
}

impl Endpoint {
    /// Append `ATYP ADDR PORT` to `buf`
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Endpoint::Ip(SocketAddr::V4(addr)) => {
                buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            Endpoint::Ip(SocketAddr::V6(addr)) => {
                buf.put_u8(SOCKS5_ADDR_TYPE_IPV6);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            Endpoint::Domain(domain, port) => {
                if domain.len() > MAX_DOMAIN_LEN {
                    return Err(Socks5Error::DomainTooLong(domain.len()));
                }
                buf.put_u8(SOCKS5_ADDR_TYPE_DOMAIN);
                buf.put_u8(domain.len() as u8);
                buf.put_slice(domain.as_bytes());
                buf.put_u16(*port);
            }
        }
        Ok(())
    }

    /// Read `ADDR PORT` for an already consumed ATYP byte
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R, atyp: u8) -> Result<Self> {
        let kind =
            AddrKind::from_byte(atyp).ok_or(Socks5Error::AddressTypeNotSupported(atyp))?;

        match kind {
            AddrKind::Ipv4 => {
                let mut addr = [0u8; 4];
                reader.read_exact(&mut addr).await?;
                let port = reader.read_u16().await?;
                Ok(Endpoint::ipv4(Ipv4Addr::from(addr), port))
            }
            AddrKind::Ipv6 => {
                let mut addr = [0u8; 16];
                reader.read_exact(&mut addr).await?;
                let port = reader.read_u16().await?;
                Ok(Endpoint::ipv6(Ipv6Addr::from(addr), port))
            }
            AddrKind::Domain => {
                let len = reader.read_u8().await? as usize;
                let mut domain = vec![0u8; len];
                reader.read_exact(&mut domain).await?;
                let port = reader.read_u16().await?;
                let domain = String::from_utf8(domain).map_err(|e| {
                    Socks5Error::InvalidDomain(String::from_utf8_lossy(e.as_bytes()).into_owned())
                })?;
                Ok(Endpoint::Domain(domain, port))
            }
        }
    }
}

impl AuthRequest {
    /// Append the encoded request to `buf`
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        if self.methods.len() > MAX_AUTH_METHODS {
            return Err(Socks5Error::TooManyMethods(self.methods.len()));
        }
        buf.put_u8(self.version);
        buf.put_u8(self.methods.len() as u8);
        buf.put_slice(&self.methods);
        Ok(())
    }

    /// Read `VER NMETHODS`, then exactly NMETHODS method bytes
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; 2];
        reader.read_exact(&mut header).await?;

        let mut methods = vec![0u8; header[1] as usize];
        reader.read_exact(&mut methods).await?;

        Ok(AuthRequest {
            version: header[0],
            methods,
        })
    }

    /// Encode and write the request
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        let mut buf = BytesMut::with_capacity(2 + self.methods.len());
        self.encode(&mut buf)?;
        write_frame(writer, &buf).await
    }
}

impl AuthReply {
    /// Append the encoded reply to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.method);
    }

    /// Read exactly two bytes
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).await?;
        Ok(AuthReply {
            version: buf[0],
            method: buf[1],
        })
    }

    /// Encode and write the reply
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        let mut buf = BytesMut::with_capacity(2);
        self.encode(&mut buf);
        write_frame(writer, &buf).await
    }
}

impl ConnectRequest {
    /// Append the encoded command to `buf`
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.version);
        buf.put_u8(self.command.to_byte());
        buf.put_u8(SOCKS5_RESERVED);
        self.target.encode(buf)
    }

    /// Read a full command frame.
    ///
    /// The address is consumed before the command byte is checked, so an
    /// unknown command still leaves the stream at a frame boundary.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; 4];
        reader.read_exact(&mut header).await?;

        let target = Endpoint::read_from(reader, header[3]).await?;
        let command =
            SocksCommand::from_byte(header[1]).ok_or(Socks5Error::CommandNotSupported(header[1]))?;

        Ok(ConnectRequest {
            version: header[0],
            command,
            target,
        })
    }

    /// Encode and write the command
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        let mut buf = BytesMut::with_capacity(6 + 1 + MAX_DOMAIN_LEN);
        self.encode(&mut buf)?;
        write_frame(writer, &buf).await
    }
}

impl ConnectReply {
    /// Append the encoded reply to `buf`
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.version);
        buf.put_u8(self.reply.into());
        buf.put_u8(SOCKS5_RESERVED);
        self.bound.encode(buf)
    }

    /// Read a full reply frame
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; 4];
        reader.read_exact(&mut header).await?;

        let bound = Endpoint::read_from(reader, header[3]).await?;
        let reply = ReplyCode::try_from(header[1])?;

        Ok(ConnectReply {
            version: header[0],
            reply,
            bound,
        })
    }

    /// Encode and write the reply
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        let mut buf = BytesMut::with_capacity(6 + 1 + MAX_DOMAIN_LEN);
        self.encode(&mut buf)?;
        write_frame(writer, &buf).await
    }
}
