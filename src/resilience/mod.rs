//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loop failure:
//!     → backoff.rs (compute delay for the next retry)
//!     → Acceptor sleeps, then retries the accept call
//! ```
//!
//! # Design Decisions
//! - First failure retries immediately; only repeated failures delay
//! - Delay doubles per consecutive failure up to a fixed ceiling
//! - Any successful accept resets the caller's stored delay

pub mod backoff;
