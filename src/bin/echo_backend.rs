//! echo-backend - a minimal TCP backend for exercising healthlb.
//!
//! Usage:
//!     echo-backend <port>
//!
//! Reads one buffer per connection and replies `Echo from port: <port>:<text>`.

use anyhow::{Context, Result};
use clap::Parser;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use healthlb::config::LogFormat;
use healthlb::util::init_logging;

/// Largest request read from a client.
const MAX_REQUEST: usize = 1023;

/// Pending connection queue length.
const BACKLOG: i32 = 5;

/// Echo backend used as a load balancer target.
#[derive(Parser, Debug)]
#[command(name = "echo-backend")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &LogFormat::Pretty);

    let port = cli.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = bind(addr).with_context(|| format!("failed to bind {}", addr))?;

    info!(listen = %addr, "echo backend listening");

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, client)) => {
                        tokio::spawn(async move {
                            if let Err(e) = echo(stream, port).await {
                                warn!(client = %client, error = %e, "echo failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("echo backend shutting down");
                return Ok(());
            }
        }
    }
}

fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    TcpListener::from_std(socket.into())
}

async fn echo(mut stream: TcpStream, port: u16) -> std::io::Result<()> {
    let mut buf = [0u8; MAX_REQUEST];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        debug!("client closed without sending");
        return Ok(());
    }

    let text = String::from_utf8_lossy(&buf[..n]);
    let response = format!("Echo from port: {}:{}", port, text);
    stream.write_all(response.as_bytes()).await
}
