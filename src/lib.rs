//! Connection-admission and lifecycle core for shared listener endpoints.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                    ENDPOINT                      │
//!                 │                                                  │
//!  Inbound        │  ┌──────────┐   ┌───────────┐   ┌────────────┐  │
//!  connection ────┼─▶│ acceptor │──▶│ admission │──▶│ dispatcher │──┼──▶ ProtocolHandler
//!                 │  │   loop   │   │   gate    │   │ + workers  │  │    (embedder)
//!                 │  └────┬─────┘   └───────────┘   └─────┬──────┘  │
//!                 │       │                               │         │
//!                 │   Transport                     ProcessorPool   │
//!                 │  (capability)                                   │
//!                 │                                                  │
//!                 │  ┌────────────────────────────────────────────┐ │
//!                 │  │            Cross-Cutting Concerns           │ │
//!                 │  │  config · tls registry · lifecycle ·        │ │
//!                 │  │  resilience · observability                 │ │
//!                 │  └────────────────────────────────────────────┘ │
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! The endpoint accepts inbound connections, enforces a global admission
//! limit, hands connections to a bounded worker pool, and manages the
//! bind/start/pause/stop/destroy lifecycle. The socket transport and the
//! protocol processing are injected capabilities ([`Transport`],
//! [`ProtocolHandler`]); this crate never interprets bytes.

// Core subsystems
pub mod config;
pub mod net;
pub mod worker;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{EndpointConfig, SocketConfig, WorkerConfig};
pub use lifecycle::{BindState, Endpoint, EndpointError, StopSignal};
pub use net::acceptor::{AcceptorGroup, AcceptorState};
pub use net::admission::{AdmissionGate, AdmissionPermit};
pub use net::connection::{Connection, ConnectionId, SocketEvent, SocketState};
pub use net::tcp::TcpTransport;
pub use net::tls::{
    PemTlsContextBuilder, TlsConfigRegistry, TlsContextBuilder, TlsHostConfig, TlsHostEntry,
    TlsRegistryError, DEFAULT_TLS_HOST_NAME,
};
pub use net::transport::{AcceptError, Transport};
pub use worker::{DispatchError, ProcessorPool, ProtocolHandler, WorkerDispatcher};
