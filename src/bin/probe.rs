//! socks5-probe - SOCKS5 handshake probe
//!
//! Connects to a SOCKS5 proxy, negotiates "no authentication", requests a
//! connection to the given destination and prints the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use socks5_relay::socks::{Socks5Client, SOCKS5_AUTH_METHOD_NONE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// socks5-probe - check that a SOCKS5 proxy can reach a destination
#[derive(Parser, Debug)]
#[command(name = "socks5-probe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Proxy address
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    proxy: String,

    /// Destination host (IPv4, IPv6 or domain name)
    host: String,

    /// Destination port
    port: u16,

    /// Payload to send once connected; the first response chunk is printed
    #[arg(short, long)]
    send: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut client = Socks5Client::dial(&args.proxy)
        .await
        .with_context(|| format!("Failed to connect to proxy {}", args.proxy))?;

    client
        .auth(SOCKS5_AUTH_METHOD_NONE)
        .await
        .context("Authentication failed")?;

    let bound = client
        .connect(&args.host, args.port)
        .await
        .with_context(|| format!("Proxy could not reach {}:{}", args.host, args.port))?;
    info!("Connected to {}:{} (bound {})", args.host, args.port, bound);

    if let Some(payload) = args.send {
        let mut stream = client.into_inner();
        stream.write_all(payload.as_bytes()).await?;
        debug!("Sent {} bytes", payload.len());

        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await?;
        println!("{}", String::from_utf8_lossy(&buf[..n]));
    }

    Ok(())
}
