//! Metrics collection.
//!
//! # Metrics
//! - `client_probe_total` (counter): probes by outcome
//! - `client_discovery_total` (counter): discoveries by winning source
//! - `client_requests_total` (counter): requests by method and outcome
//! - `client_request_duration_seconds` (histogram): end-to-end latency
//! - `client_token_refresh_total` (counter): refresh exchanges by outcome

use metrics::{counter, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Turn metric recording on or off process-wide.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn record_probe(reachable: bool) {
    if !enabled() {
        return;
    }
    let outcome = if reachable { "reachable" } else { "unreachable" };
    counter!("client_probe_total", "outcome" => outcome).increment(1);
}

pub fn record_discovery(source: &'static str) {
    if !enabled() {
        return;
    }
    counter!("client_discovery_total", "source" => source).increment(1);
}

pub fn record_request(method: &str, outcome: &str, start: Instant) {
    if !enabled() {
        return;
    }
    counter!(
        "client_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("client_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_token_refresh(success: bool) {
    if !enabled() {
        return;
    }
    let outcome = if success { "success" } else { "failure" };
    counter!("client_token_refresh_total", "outcome" => outcome).increment(1);
}
