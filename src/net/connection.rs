//! Accepted-connection wrapper and processing vocabulary.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Tie an accepted transport handle to its admission slot
//! - Define the event/state vocabulary shared with protocol handlers

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Mutex as IoMutex;

use crate::net::admission::AdmissionPermit;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Events that can be raised against a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketEvent {
    /// Data is available to read, or a new connection is ready for its
    /// first read.
    OpenRead,
    /// The connection is ready for a write to continue.
    OpenWrite,
    /// The endpoint is stopping and the connection should wind down.
    Stop,
    /// An I/O timeout fired for the connection.
    Timeout,
    /// The peer disconnected.
    Disconnect,
    /// An error occurred on the connection.
    Error,
}

impl std::fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::OpenRead => "open-read",
            Self::OpenWrite => "open-write",
            Self::Stop => "stop",
            Self::Timeout => "timeout",
            Self::Disconnect => "disconnect",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Handler verdict for a connection after processing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Keep the connection open; the embedder re-arms it for more events.
    Open,
    /// The connection is finished and its resources can go.
    Closed,
    /// Processing is parked waiting on an external completion.
    Suspended,
    /// The connection switched protocols and left this endpoint's control.
    Upgraded,
}

/// An accepted connection bound to its admission slot.
///
/// The transport handle lives behind an async lock; only one processor is
/// in flight per connection at a time, so the lock is uncontended in the
/// normal path. Dropping the last reference releases the admission slot and
/// closes the handle.
#[derive(Debug)]
pub struct Connection<C> {
    id: ConnectionId,
    io: IoMutex<C>,
    permit: Mutex<Option<AdmissionPermit>>,
    closed: AtomicBool,
}

impl<C> Connection<C> {
    pub fn new(inner: C, permit: Option<AdmissionPermit>) -> Self {
        Self {
            id: ConnectionId::new(),
            io: IoMutex::new(inner),
            permit: Mutex::new(permit),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Access the transport handle.
    pub fn io(&self) -> &IoMutex<C> {
        &self.io
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the connection closed and free its admission slot. Idempotent;
    /// the transport handle itself closes when the last reference drops.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            drop(self.permit.lock().take());
            tracing::trace!(connection_id = %self.id, "connection closed");
        }
    }
}

impl<C> Drop for Connection<C> {
    fn drop(&mut self) {
        self.close();
    }
}
