//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by outcome and status
//! - `relay_request_duration_seconds` (histogram): time to response headers
//!
//! Outcome is `resolved` for targets parsed from the path and `malformed`
//! for requests answered by the diagnostic backend. Recording is a no-op
//! until a recorder is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one relayed request.
pub fn record_request(outcome: &'static str, status: u16, start_time: Instant) {
    ::metrics::counter!(
        "relay_requests_total",
        "outcome" => outcome,
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("relay_request_duration_seconds", "outcome" => outcome)
        .record(start_time.elapsed().as_secs_f64());
}
