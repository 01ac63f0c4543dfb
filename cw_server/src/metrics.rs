//! Prometheus metrics for monitoring the wallet shard.
//!
//! Metrics are exported in Prometheus text format on a dedicated listener
//! (see `METRICS_BIND`); nothing is exported when that listener is not
//! configured.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: request counts, duration, status codes
//! - **Wallet Metrics**: operation counts and outcomes, replayed requests
//! - **Persistence Metrics**: snapshot write failures
//! - **Lock Metrics**: forced lock steals
//! - **Rake Metrics**: chips raked

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request with method, path, and status labels.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Wallet Metrics
// ============================================================================

/// Record one wallet operation and its outcome (`ok`, `rejected`, `failed`).
pub fn wallet_operations_total(op: &'static str, outcome: &'static str) {
    metrics::counter!("wallet_operations_total",
        "op" => op,
        "outcome" => outcome
    )
    .increment(1);
}

/// Increment idempotent replay counter.
pub fn idempotent_replays_total() {
    metrics::counter!("idempotent_replays_total").increment(1);
}

/// Set current wallet count.
pub fn wallet_count(count: usize) {
    metrics::gauge!("wallet_count").set(count as f64);
}

/// Set current total of frozen chips.
pub fn frozen_chips_total(total: i64) {
    metrics::gauge!("frozen_chips_total").set(total as f64);
}

// ============================================================================
// Persistence Metrics
// ============================================================================

/// Increment snapshot write failure counter.
pub fn snapshot_write_failures_total() {
    metrics::counter!("snapshot_write_failures_total").increment(1);
}

// ============================================================================
// Lock Metrics
// ============================================================================

/// Set total forced lock steals since startup.
pub fn lock_steals_total(count: u64) {
    metrics::gauge!("lock_steals_total").set(count as f64);
}

// ============================================================================
// Rake Metrics
// ============================================================================

/// Record chips raked from one hand.
pub fn rake_collected(amount: i64) {
    metrics::counter!("rake_collected_total").increment(amount.max(0) as u64);
}
