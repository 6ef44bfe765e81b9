//! Transport capability contract.
//!
//! The endpoint core never touches bytes or sockets directly; it drives a
//! [`Transport`] implementation through this narrow contract. A transport
//! owns the listening primitive and classifies its accept failures so the
//! acceptor loop knows whether to retry with backoff or end.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EndpointConfig;

/// Accept-loop failure classification.
#[derive(Debug, Error)]
pub enum AcceptError {
    /// Recoverable condition; the acceptor backs off and retries.
    #[error("transient accept failure: {0}")]
    Transient(#[source] io::Error),
    /// The listening socket is gone; the acceptor ends.
    #[error("fatal accept failure: {0}")]
    Fatal(#[source] io::Error),
}

/// A pluggable listening transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connection handle produced by a successful accept.
    type Conn: Send + Sync + 'static;

    /// Bind the listening socket and return the bound local address.
    async fn bind(&self, config: &EndpointConfig) -> io::Result<SocketAddr>;

    /// Close the listening socket.
    async fn unbind(&self) -> io::Result<()>;

    /// Wait for one inbound connection.
    async fn accept_one(&self) -> Result<Self::Conn, AcceptError>;

    /// Local address while bound.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// True when the platform holds accepts back until request data arrives
    /// (deferred accept / accept filters). The unlock path must then push a
    /// throwaway request line through to wake the acceptor.
    fn defer_accept(&self) -> bool {
        false
    }
}
