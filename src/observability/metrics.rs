//! Metric names and exporter setup.
//!
//! # Metrics
//! - `endpoint_open_connections` (gauge): connections currently admitted
//! - `endpoint_accept_errors_total` (counter): transient accept failures
//! - `endpoint_dispatch_rejected_total` (counter): connections refused by a
//!   saturated worker queue
//! - `endpoint_busy_workers` (gauge): workers currently processing

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const OPEN_CONNECTIONS: &str = "endpoint_open_connections";
pub const ACCEPT_ERRORS_TOTAL: &str = "endpoint_accept_errors_total";
pub const DISPATCH_REJECTED_TOTAL: &str = "endpoint_dispatch_rejected_total";
pub const BUSY_WORKERS: &str = "endpoint_busy_workers";

/// Install the Prometheus exporter on the given address. Failures are
/// logged, not fatal; the endpoint runs fine without metrics.
pub fn install_exporter(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics exporter listening"),
        Err(err) => tracing::error!(error = %err, "failed to install metrics exporter"),
    }
}
