//! Metrics collection and exposition.
//!
//! # Metrics
//! - `acceptor_connections_accepted_total` (counter): dispatched connections
//! - `acceptor_connections_rejected_total` (counter): closed at the admission limit
//! - `acceptor_accept_errors_total` (counter): transient accept failures
//! - `acceptor_active_connections` (gauge): current live connection count
//! - `acceptor_connection_duration_seconds` (histogram): dispatch to close
//!
//! Recording is a no-op until a recorder is installed (see [`init_metrics`]).

use std::net::SocketAddr;
use std::time::Duration;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_accepted() {
    metrics::counter!("acceptor_connections_accepted_total").increment(1);
}

pub fn record_rejected() {
    metrics::counter!("acceptor_connections_rejected_total").increment(1);
}

pub fn record_accept_error() {
    metrics::counter!("acceptor_accept_errors_total").increment(1);
}

/// The gauge moves by deltas so concurrent opens and closes cannot leave
/// it on a stale absolute value.
pub fn record_connection_opened() {
    metrics::gauge!("acceptor_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    metrics::gauge!("acceptor_active_connections").decrement(1.0);
}

pub fn record_connection_duration(elapsed: Duration) {
    metrics::histogram!("acceptor_connection_duration_seconds").record(elapsed.as_secs_f64());
}
