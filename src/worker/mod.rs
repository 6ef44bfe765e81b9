//! Worker-dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection + event
//!     → dispatcher.rs (inline, or queued to a worker task)
//!     → processor.rs (reusable task: runs the protocol handler)
//!     → Handler verdict decides: keep open, or release and close
//!     → Processor returns to the pool, scrubbed of the connection
//! ```
//!
//! # Design Decisions
//! - Processors are pooled; steady-state dispatch allocates nothing
//! - Queue saturation is an administrative failure, not a crash
//! - The caller owns an undispatched connection and must close it

use std::sync::Arc;

use async_trait::async_trait;

use crate::net::connection::{Connection, SocketEvent, SocketState};

pub mod dispatcher;
pub mod processor;

pub use dispatcher::{DispatchError, WorkerDispatcher};
pub use processor::{Processor, ProcessorPool};

/// Protocol-level processing supplied by the embedder.
///
/// The endpoint core hands every admitted connection to this seam and never
/// interprets bytes itself.
#[async_trait]
pub trait ProtocolHandler<C: Send + Sync + 'static>: Send + Sync + 'static {
    /// Process one event on a connection and return its next state.
    async fn process(&self, conn: &Arc<Connection<C>>, event: SocketEvent) -> SocketState;

    /// Number of connections the handler currently tracks as open.
    fn open_connections(&self) -> usize;

    /// Release protocol resources tied to a finished connection.
    async fn release(&self, conn: &Arc<Connection<C>>);

    /// The endpoint stopped accepting new connections; stop advertising
    /// readiness. A stop does not necessarily follow.
    fn pause(&self);

    /// Drop cached per-connection resources after the endpoint stops.
    fn recycle(&self);
}
