//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming connection
//!     → acceptor.rs (accept loop, stop/pause handling, backoff)
//!     → admission.rs (concurrency gate, may park the acceptor)
//!     → connection.rs (wrapper: id, io lock, admission slot)
//!     → Hand off to the worker subsystem
//!
//! TLS identity selection (SNI) runs against tls.rs before a handshake,
//! outside this crate.
//! ```
//!
//! # Design Decisions
//! - The transport is a capability (transport.rs); tcp.rs is the shipped
//!   reference implementation
//! - Admission happens after accept, so a paused endpoint never grows the
//!   connection count
//! - Each connection is tracked for graceful shutdown

pub mod acceptor;
pub mod admission;
pub mod connection;
pub mod tcp;
pub mod tls;
pub mod transport;
