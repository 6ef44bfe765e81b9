//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (gauges and counters via the metrics facade)
//!
//! Consumers:
//!     → Log aggregation (stdout, controlled by EnvFilter)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Metric updates are atomic and cheap; recording never blocks the
//!   accept or dispatch path
//! - Log level configurable via config and environment

pub mod logging;
pub mod metrics;
