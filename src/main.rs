//! Standalone endpoint runner.
//!
//! Boots an endpoint from a TOML configuration (or defaults) with a simple
//! echo handler, then drives the pause/stop/destroy sequence on ctrl-c.
//! Useful for smoke testing a deployment's limits and socket options.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use portico::config::{load_config, EndpointConfig};
use portico::net::connection::{Connection, SocketEvent, SocketState};
use portico::worker::ProtocolHandler;
use portico::{Endpoint, TcpTransport};

#[derive(Parser)]
#[command(name = "portico")]
#[command(about = "Connection-admission endpoint runner", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Echoes whatever the peer sends until EOF, then closes.
#[derive(Default)]
struct EchoHandler {
    open: AtomicUsize,
}

#[async_trait]
impl ProtocolHandler<TcpStream> for EchoHandler {
    async fn process(&self, conn: &Arc<Connection<TcpStream>>, event: SocketEvent) -> SocketState {
        if event != SocketEvent::OpenRead {
            return SocketState::Closed;
        }
        self.open.fetch_add(1, Ordering::Relaxed);
        let mut io = conn.io().lock().await;
        let mut buf = [0u8; 4096];
        loop {
            match io.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if io.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(connection_id = %conn.id(), error = %err, "read failed");
                    break;
                }
            }
        }
        self.open.fetch_sub(1, Ordering::Relaxed);
        SocketState::Closed
    }

    fn open_connections(&self) -> usize {
        self.open.load(Ordering::Relaxed)
    }

    async fn release(&self, _conn: &Arc<Connection<TcpStream>>) {}

    fn pause(&self) {}

    fn recycle(&self) {}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => load_config(&path)?,
        None => EndpointConfig::default(),
    };

    portico::observability::logging::init(&format!(
        "portico={}",
        config.observability.log_level
    ));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => portico::observability::metrics::install_exporter(addr),
            Err(err) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %err,
                "invalid metrics address"
            ),
        }
    }

    tracing::info!(
        bind_address = %config.bind_address,
        max_connections = config.max_connections,
        acceptors = config.acceptor_count,
        "configuration loaded"
    );

    let handler = Arc::new(EchoHandler::default());
    let endpoint = Endpoint::new(config, TcpTransport::new(), handler);
    endpoint.register_configured_tls_hosts()?;

    endpoint.init().await?;
    endpoint.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    endpoint.pause().await;
    endpoint.stop().await?;
    endpoint.destroy().await?;
    tracing::info!("shutdown complete");
    Ok(())
}
