//! Bidirectional relay between the client and upstream connections
//!
//! Each direction is a paced pump: read with an optional deadline into a
//! fixed buffer, write everything read to the peer, sleep a short pause,
//! repeat. A read deadline firing is not a fault, the pump just goes round
//! again. Both pumps share one cancellation token; whichever stops first
//! cancels it so the other stops too, and the connections are shut down
//! together once both pumps have returned.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Settings for one relay direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpConfig {
    /// Deadline armed before every read
    pub read_deadline: Option<Duration>,
    /// Deadline for writing one chunk to the peer
    pub write_deadline: Option<Duration>,
    /// Size of the read buffer
    pub buf_len: usize,
    /// Sleep between iterations
    pub pause: Duration,
}

/// Why a pump stopped
#[derive(Debug)]
pub enum PumpEnd {
    /// The reading side reached end of stream
    Eof,
    /// The session was cancelled
    Cancelled,
    /// Reading failed with something other than a deadline
    ReadFailed(io::Error),
    /// Writing to the peer failed or hit its deadline
    WriteFailed(io::Error),
}

impl PumpEnd {
    /// Whether the pump stopped because of an I/O failure
    pub fn is_error(&self) -> bool {
        matches!(self, PumpEnd::ReadFailed(_) | PumpEnd::WriteFailed(_))
    }
}

/// Outcome of one direction
#[derive(Debug)]
pub struct PumpReport {
    /// Bytes written to the peer
    pub bytes: u64,
    /// Termination cause
    pub end: PumpEnd,
}

/// Outcome of a whole relay, one report per direction
#[derive(Debug)]
pub struct RelayReport {
    /// Client to upstream direction
    pub client_to_upstream: PumpReport,
    /// Upstream to client direction
    pub upstream_to_client: PumpReport,
}

impl RelayReport {
    /// Whether either direction ended with an I/O failure
    pub fn has_error(&self) -> bool {
        self.client_to_upstream.end.is_error() || self.upstream_to_client.end.is_error()
    }
}

enum ReadOutcome {
    Data(usize),
    DeadlineElapsed,
}

async fn read_chunk<R>(
    reader: &mut R,
    buf: &mut [u8],
    deadline: Option<Duration>,
) -> io::Result<ReadOutcome>
where
    R: AsyncRead + Unpin,
{
    match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, reader.read(buf)).await {
            Ok(read) => read.map(ReadOutcome::Data),
            Err(_) => Ok(ReadOutcome::DeadlineElapsed),
        },
        None => reader.read(buf).await.map(ReadOutcome::Data),
    }
}

async fn write_chunk<W>(writer: &mut W, chunk: &[u8], deadline: Option<Duration>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(chunk).await?;
        writer.flush().await
    };
    match deadline {
        Some(deadline) => tokio::time::timeout(deadline, write)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write deadline elapsed"))?,
        None => write.await,
    }
}

/// Copy from `reader` to `writer` until end of stream, failure or cancellation
pub async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    config: &PumpConfig,
    cancel: &CancellationToken,
) -> PumpReport
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; config.buf_len.max(1)];
    let mut bytes = 0u64;

    let end = loop {
        if cancel.is_cancelled() {
            break PumpEnd::Cancelled;
        }

        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break PumpEnd::Cancelled,
            read = read_chunk(reader, &mut buf, config.read_deadline) => read,
        };

        match read {
            Ok(ReadOutcome::DeadlineElapsed) => trace!("Read deadline elapsed"),
            Ok(ReadOutcome::Data(0)) => break PumpEnd::Eof,
            Ok(ReadOutcome::Data(n)) => {
                if let Err(e) = write_chunk(writer, &buf[..n], config.write_deadline).await {
                    break PumpEnd::WriteFailed(e);
                }
                bytes += n as u64;
            }
            Err(e) => break PumpEnd::ReadFailed(e),
        }

        if !config.pause.is_zero() {
            tokio::time::sleep(config.pause).await;
        }
    };

    PumpReport { bytes, end }
}

/// Relay between `client` and `upstream` until both directions have stopped.
///
/// Both connections are shut down together afterwards, so data still in
/// flight in the other direction may be cut off.
pub async fn relay<A, B>(
    client: A,
    upstream: B,
    client_to_upstream: &PumpConfig,
    upstream_to_client: &PumpConfig,
    cancel: CancellationToken,
) -> RelayReport
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let outbound = async {
        let report = pump(&mut client_read, &mut upstream_write, client_to_upstream, &cancel).await;
        cancel.cancel();
        report
    };
    let inbound = async {
        let report = pump(&mut upstream_read, &mut client_write, upstream_to_client, &cancel).await;
        cancel.cancel();
        report
    };

    let (client_to_upstream, upstream_to_client) = tokio::join!(outbound, inbound);

    if let Err(e) = client_write.shutdown().await {
        trace!("Client shutdown: {}", e);
    }
    if let Err(e) = upstream_write.shutdown().await {
        trace!("Upstream shutdown: {}", e);
    }

    debug!(
        "Relay finished: client->upstream {} bytes ({:?}), upstream->client {} bytes ({:?})",
        client_to_upstream.bytes,
        client_to_upstream.end,
        upstream_to_client.bytes,
        upstream_to_client.end
    );

    RelayReport {
        client_to_upstream,
        upstream_to_client,
    }
}
