//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! init:   bind eagerly when configured (undone by destroy)
//! start:  bind if needed → admission gate → dispatcher → acceptors
//! pause:  flag + unlock accept + notify handler (resume undoes)
//! stop:   stop signal → unlock accept → drain acceptors → shut down
//!         dispatcher → unbind when bound on start
//! ```
//!
//! # Design Decisions
//! - Bind/unbind pairing is the only state tracked here; call ordering is
//!   the owner's contract
//! - Stop has bounded waits at every step: acceptor drain, worker grace
//! - Unlock-accept is best effort and never escalates failures

pub mod endpoint;
pub mod shutdown;

pub use endpoint::{BindState, Endpoint, EndpointError};
pub use shutdown::StopSignal;
