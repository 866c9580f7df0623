//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_decisions_total` (counter): routing decisions by outcome
//! - `router_decision_duration_seconds` (histogram): time spent deciding,
//!   recording included
//! - `router_recording_failures_total` (counter): swallowed statistic/log
//!   write failures by sink
//! - `router_logs_pruned_total` (counter): log rows removed by retention
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder
//!   every call is a no-op, which keeps tests free of global state
//! - Prometheus exposition only when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_decision(outcome: &'static str, started: Instant) {
    ::metrics::counter!("router_decisions_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("router_decision_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_recording_failure(sink: &'static str) {
    ::metrics::counter!("router_recording_failures_total", "sink" => sink).increment(1);
}

pub fn record_logs_pruned(tenant: u32, rows: u64) {
    ::metrics::counter!("router_logs_pruned_total", "tenant" => tenant.to_string()).increment(rows);
}
