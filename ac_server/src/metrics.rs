//! Prometheus metrics for the credential service.
//!
//! Metrics are exposed in Prometheus text format on the optional
//! `METRICS_BIND` listener for scraping.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize the Prometheus metrics exporter.
///
/// Metrics become available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

/// Record a login attempt.
pub fn login_attempts_total(success: bool) {
    metrics::counter!("login_attempts_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Record a completed registration.
pub fn registrations_total() {
    metrics::counter!("registrations_total").increment(1);
}

/// Record a password reset request (whether or not the email resolved).
pub fn password_reset_requests_total() {
    metrics::counter!("password_reset_requests_total").increment(1);
}

/// Record a rate-limit rejection.
pub fn rate_limit_hits_total(endpoint: &str) {
    metrics::counter!("rate_limit_hits_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}

/// Record tokens removed by a cleanup sweep.
pub fn cleanup_removed_tokens(count: u64) {
    metrics::counter!("cleanup_removed_tokens_total").increment(count);
}
