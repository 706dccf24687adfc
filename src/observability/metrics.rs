//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_reconcile_passes_total` (counter): passes by outcome
//!   (`applied`, `unchanged`, `rejected`, `source_error`)
//! - `router_reconcile_duration_seconds` (histogram)
//! - `router_model_transitions_total` (counter): entries into each status
//! - `router_models` (gauge): current entries per status
//! - `router_model_load_duration_seconds` (histogram): by outcome
//! - `router_requests_total` (counter): proxied requests by model, status
//! - `router_request_duration_seconds` (histogram): by model

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::registry::ModelStatus;

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(err) => tracing::error!(address = %addr, error = %err, "Failed to install metrics recorder"),
    }
}

pub fn record_pass(outcome: &'static str, elapsed: Duration) {
    counter!("router_reconcile_passes_total", "outcome" => outcome).increment(1);
    if outcome == "applied" || outcome == "unchanged" {
        histogram!("router_reconcile_duration_seconds").record(elapsed.as_secs_f64());
    }
}

pub fn record_transition(status: ModelStatus) {
    counter!("router_model_transitions_total", "status" => status.as_str()).increment(1);
}

/// Publish per-status entry counts; statuses with no entries report zero.
pub fn record_fleet(counts: &HashMap<ModelStatus, usize>) {
    for status in ModelStatus::ALL {
        let n = counts.get(&status).copied().unwrap_or(0);
        gauge!("router_models", "status" => status.as_str()).set(n as f64);
    }
}

pub fn record_load(outcome: &'static str, elapsed: Duration) {
    histogram!("router_model_load_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

pub fn record_request(model: &str, status: u16, elapsed: Duration) {
    counter!(
        "router_requests_total",
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("router_request_duration_seconds", "model" => model.to_string())
        .record(elapsed.as_secs_f64());
}
