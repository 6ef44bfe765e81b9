//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! TOML file
//!     → loader.rs (read + parse)
//!     → validation.rs (semantic checks, all errors collected)
//!     → schema.rs types, consumed by the endpoint at construction
//! ```
//!
//! # Design Decisions
//! - One explicit structure, built before start; no runtime property bag
//! - Every field has a default so partial files work
//! - Pool sizing changes after start go through the explicit live-resize
//!   calls on the endpoint, not through configuration mutation

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{EndpointConfig, ObservabilityConfig, SocketConfig, WorkerConfig};
pub use validation::{validate_config, ValidationError};
