//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_requests_total` (counter): requests by method, status
//! - `guard_request_duration_seconds` (histogram): latency distribution
//! - `guard_rate_limited_total` (counter): 429s by limiter
//! - `guard_csrf_rejections_total` (counter): 403s by reason
//! - `guard_sessions_active` (gauge): sessions held in the registry
//! - `guard_sweep_removed_total` (counter): entries dropped by sweeps
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "guard_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("guard_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(limiter: &'static str) {
    metrics::counter!("guard_rate_limited_total", "limiter" => limiter).increment(1);
}

pub fn record_csrf_rejection(reason: &'static str) {
    metrics::counter!("guard_csrf_rejections_total", "reason" => reason).increment(1);
}

pub fn record_sessions(count: usize) {
    metrics::gauge!("guard_sessions_active").set(count as f64);
}

pub fn record_sweep(registry: &'static str, removed: usize) {
    metrics::counter!("guard_sweep_removed_total", "registry" => registry).increment(removed as u64);
}
