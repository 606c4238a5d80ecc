//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_records_forwarded_total` (counter): attempts by result
//!   (`success`, `failure`, `rejected`)
//! - `relay_send_duration_seconds` (histogram): send latency
//! - `relay_attempts_refused_total` (counter): attempts refused by the breaker
//! - `relay_commit_failures_total` / `relay_receive_errors_total` (counters)
//! - `relay_intake_paused` (gauge): 1 while intake is paused
//! - `relay_breaker_state` (gauge): 0=closed, 1=open, 2=half_open
//! - `relay_breaker_transitions_total` (counter): transitions by target state
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op, so library code
//!   and tests record unconditionally
//! - Labels stay low-cardinality (result, breaker name, state)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_forward(result: &'static str) {
    counter!("relay_records_forwarded_total", "result" => result).increment(1);
}

pub fn record_send_duration(start: Instant) {
    histogram!("relay_send_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_refused() {
    counter!("relay_attempts_refused_total").increment(1);
}

pub fn record_commit_failure() {
    counter!("relay_commit_failures_total").increment(1);
}

pub fn record_receive_error() {
    counter!("relay_receive_errors_total").increment(1);
}

pub fn record_intake_paused(paused: bool) {
    gauge!("relay_intake_paused").set(if paused { 1.0 } else { 0.0 });
}

pub fn record_breaker_state(breaker: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    gauge!("relay_breaker_state", "breaker" => breaker.to_string()).set(value);
}

pub fn record_breaker_transition(breaker: &str, to: CircuitState) {
    counter!(
        "relay_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
}
