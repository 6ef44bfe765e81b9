//! Configuration schema definitions.
//!
//! One explicit, validated structure constructed before `init`/`start`.
//! All types derive Serde traits for deserialization from config files;
//! every field has a default so partial files work.

use serde::{Deserialize, Serialize};

use crate::net::tls::{TlsHostConfig, DEFAULT_TLS_HOST_NAME};

/// Root configuration for a listener endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Endpoint name, used in logs and task names.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Listen backlog passed to the transport.
    pub accept_backlog: u32,

    /// Number of concurrent acceptor tasks.
    pub acceptor_count: usize,

    /// Maximum concurrently admitted connections; -1 means unlimited.
    pub max_connections: i64,

    /// Bind the transport on `init` (unbound on `destroy`) rather than on
    /// `start` (unbound on `stop`).
    pub bind_on_init: bool,

    /// Worker pool sizing and shutdown behavior.
    pub workers: WorkerConfig,

    /// Per-connection socket options, passed through to the transport.
    pub socket: SocketConfig,

    /// Named TLS identities, one per virtual host.
    pub tls_hosts: Vec<TlsHostConfig>,

    /// Virtual-host name resolved when SNI matches nothing.
    pub default_tls_host: String,

    /// Protocol names offered for negotiation (e.g. ALPN identifiers).
    pub negotiable_protocols: Vec<String>,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: "endpoint".to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
            accept_backlog: 100,
            acceptor_count: 1,
            max_connections: 10_000,
            bind_on_init: true,
            workers: WorkerConfig::default(),
            socket: SocketConfig::default(),
            tls_hosts: Vec::new(),
            default_tls_host: DEFAULT_TLS_HOST_NAME.to_string(),
            negotiable_protocols: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Workers kept alive even when idle.
    pub core: usize,

    /// Upper bound on concurrently live workers.
    pub max: usize,

    /// Dispatch queue capacity; a full queue rejects the connection.
    pub queue_capacity: usize,

    /// How long a stopping pool waits for in-flight work before aborting,
    /// in milliseconds.
    pub termination_grace_ms: u64,

    /// Idle processor objects cached between dispatches.
    pub processor_cache: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            core: 10,
            max: 200,
            queue_capacity: 128,
            termination_grace_ms: 5_000,
            processor_cache: 128,
        }
    }
}

/// Per-connection socket options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm on accepted connections.
    pub tcp_nodelay: bool,

    /// SO_LINGER in seconds; unset leaves the platform default.
    pub so_linger_secs: Option<u64>,

    /// I/O timeout for accepted connections, in milliseconds.
    pub connection_timeout_ms: u64,

    /// Keep-alive timeout in milliseconds; unset falls back to
    /// `connection_timeout_ms`.
    pub keep_alive_timeout_ms: Option<u64>,

    /// Connect timeout for the loopback unlock connection, in
    /// milliseconds. Values under two seconds are raised to two seconds.
    pub unlock_timeout_ms: u64,
}

impl SocketConfig {
    /// Keep-alive timeout with the connection-timeout fallback applied.
    pub fn effective_keep_alive_timeout_ms(&self) -> u64 {
        self.keep_alive_timeout_ms
            .unwrap_or(self.connection_timeout_ms)
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            so_linger_secs: None,
            connection_timeout_ms: 60_000,
            keep_alive_timeout_ms: None,
            unlock_timeout_ms: 250,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
