//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define engine metrics (requests, latency, snapshot writes, renders)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `engine_requests_total` (counter): requests by method, status, route
//! - `engine_request_duration_seconds` (histogram): latency distribution
//! - `engine_snapshot_writes_total` (counter): snapshot file writes by result
//! - `engine_renders_total` (counter): PNG renders by result
//! - `engine_reloads_total` (counter): endpoint reloads by result
//! - `engine_routes` (gauge): routes in the active table
//! - `engine_snapshots` (gauge): snapshot keys holding state
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed, so library code records unconditionally
//! - Route label is the declared pattern, never the raw path

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    metrics::counter!(
        "engine_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    metrics::histogram!("engine_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_snapshot_write(ok: bool) {
    metrics::counter!("engine_snapshot_writes_total", "result" => result_label(ok)).increment(1);
}

pub fn record_render(ok: bool) {
    metrics::counter!("engine_renders_total", "result" => result_label(ok)).increment(1);
}

pub fn record_reload(ok: bool) {
    metrics::counter!("engine_reloads_total", "result" => result_label(ok)).increment(1);
}

pub fn record_route_count(count: usize) {
    metrics::gauge!("engine_routes").set(count as f64);
}

pub fn record_snapshot_count(count: usize) {
    metrics::gauge!("engine_snapshots").set(count as f64);
}

fn result_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}
