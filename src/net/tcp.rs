//! Reference TCP transport.
//!
//! # Responsibilities
//! - Bind to the configured address with the configured backlog
//! - Apply per-connection socket options on accept
//! - Classify accept failures as transient (retry) or fatal (loop ends)

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::config::{EndpointConfig, SocketConfig};
use crate::net::transport::{AcceptError, Transport};

/// TCP listener transport for the endpoint core.
#[derive(Debug, Default)]
pub struct TcpTransport {
    listener: ArcSwapOption<TcpListener>,
    options: Mutex<SocketConfig>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_options(&self, stream: &TcpStream) {
        let options = self.options.lock().clone();
        if options.tcp_nodelay {
            if let Err(err) = stream.set_nodelay(true) {
                tracing::debug!(error = %err, "could not set TCP_NODELAY");
            }
        }
        if let Some(secs) = options.so_linger_secs {
            if let Err(err) = stream.set_linger(Some(Duration::from_secs(secs))) {
                tracing::debug!(error = %err, "could not set SO_LINGER");
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Conn = TcpStream;

    async fn bind(&self, config: &EndpointConfig) -> io::Result<SocketAddr> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.accept_backlog)?;
        let local_addr = listener.local_addr()?;

        *self.options.lock() = config.socket.clone();
        self.listener.store(Some(Arc::new(listener)));
        tracing::info!(
            address = %local_addr,
            backlog = config.accept_backlog,
            "listener bound"
        );
        Ok(local_addr)
    }

    async fn unbind(&self) -> io::Result<()> {
        if self.listener.swap(None).is_some() {
            tracing::info!("listener unbound");
        }
        Ok(())
    }

    async fn accept_one(&self) -> Result<TcpStream, AcceptError> {
        let listener = match self.listener.load_full() {
            Some(listener) => listener,
            None => {
                return Err(AcceptError::Fatal(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "listener is not bound",
                )))
            }
        };
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                self.apply_options(&stream);
                tracing::trace!(peer_addr = %peer_addr, "connection accepted");
                Ok(stream)
            }
            Err(err) => {
                // An unbind between the load above and the failure means the
                // listener went away under us; everything else is worth a
                // retry after backoff.
                if self.listener.load().is_none() {
                    Err(AcceptError::Fatal(err))
                } else {
                    Err(AcceptError::Transient(err))
                }
            }
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .load()
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }
}
