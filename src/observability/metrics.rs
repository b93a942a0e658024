//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_backend_failures_total` (counter): failures counted by the breaker
//! - `gateway_circuit_open_total` (counter): backends quarantined
//! - `gateway_rate_limited_total` (counter): requests rejected with 429
//! - `gateway_load_alerts_total` (counter): critical load alerts
//! - `gateway_saga_total` (counter): saga runs by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until `init_metrics` installs the exporter
//! - Labels for service, backend, status code

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    let labels = vec![
        Label::new("method", method.to_string()),
        Label::new("status", status.to_string()),
        Label::new("service", service.to_string()),
    ];
    counter!("gateway_requests_total", labels.clone()).increment(1);
    histogram!("gateway_request_duration_seconds", labels).record(start.elapsed().as_secs_f64());
}

pub fn record_backend_failure(service: &str, backend: &str) {
    counter!(
        "gateway_backend_failures_total",
        "service" => service.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
}

pub fn record_circuit_open(service: &str, backend: &str) {
    counter!(
        "gateway_circuit_open_total",
        "service" => service.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
}

pub fn record_rate_limited(reason: &'static str) {
    counter!("gateway_rate_limited_total", "reason" => reason).increment(1);
}

pub fn record_load_alert(service: &str) {
    counter!("gateway_load_alerts_total", "service" => service.to_string()).increment(1);
}

pub fn record_saga(outcome: &'static str) {
    counter!("gateway_saga_total", "outcome" => outcome).increment(1);
}
