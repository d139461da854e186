//! Lightweight metrics helpers for Junction.
//!
//! This module exposes a small set of convenience functions and RAII timers
//! wrapping the `metrics` crate macros. It intentionally avoids embedding a
//! concrete exporter (the application can initialize any compatible recorder
//! externally) while still documenting and describing Junction-specific
//! metric names.
//!
//! Provided metrics (labels vary by family):
//! * `junction_requests_total` (counter)
//! * `junction_request_duration_seconds` (histogram)
//! * `junction_dispatches_total` (counter)
//! * `junction_ingress_rejections_total` (counter)
//! * `junction_inflight_requests` (gauge)
//! * `junction_circuit_breaker_state` (gauge per service)
//! * `junction_circuit_breaker_transitions_total` (counter)
//! * `junction_registry_records` (gauge)
//!
//! The timer struct leverages `Drop` to record durations safely even when
//! early returns or errors occur.
use std::{collections::HashMap, sync::Mutex, time::Instant};

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

use crate::core::circuit_breaker::CircuitState;

// Junction-specific metric names
pub const JUNCTION_REQUESTS_TOTAL: &str = "junction_requests_total";
pub const JUNCTION_REQUEST_DURATION_SECONDS: &str = "junction_request_duration_seconds";
pub const JUNCTION_DISPATCHES_TOTAL: &str = "junction_dispatches_total";
pub const JUNCTION_INGRESS_REJECTIONS_TOTAL: &str = "junction_ingress_rejections_total";
pub const JUNCTION_INFLIGHT_REQUESTS: &str = "junction_inflight_requests";
pub const JUNCTION_CIRCUIT_BREAKER_STATE: &str = "junction_circuit_breaker_state";
pub const JUNCTION_CIRCUIT_BREAKER_TRANSITIONS_TOTAL: &str =
    "junction_circuit_breaker_transitions_total";
pub const JUNCTION_REGISTRY_RECORDS: &str = "junction_registry_records";

/// Storage for per-service circuit state gauges
pub static CIRCUIT_STATE_GAUGES: Lazy<Mutex<HashMap<String, f64>>> = Lazy::new(|| {
    // Register metric descriptions
    describe_counter!(
        JUNCTION_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests processed by the gateway."
    );
    describe_histogram!(
        JUNCTION_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests processed by the gateway."
    );
    describe_counter!(
        JUNCTION_DISPATCHES_TOTAL,
        Unit::Count,
        "Total number of requests dispatched to backend services."
    );
    describe_counter!(
        JUNCTION_INGRESS_REJECTIONS_TOTAL,
        Unit::Count,
        "Requests shed at ingress because the gateway was saturated."
    );
    describe_gauge!(
        JUNCTION_INFLIGHT_REQUESTS,
        "Number of requests currently holding an ingress permit."
    );
    describe_gauge!(
        JUNCTION_CIRCUIT_BREAKER_STATE,
        "Circuit state per service (0 closed, 1 open, 2 half-open)."
    );
    describe_counter!(
        JUNCTION_CIRCUIT_BREAKER_TRANSITIONS_TOTAL,
        Unit::Count,
        "Circuit breaker state transitions (by service and target state)."
    );
    describe_gauge!(
        JUNCTION_REGISTRY_RECORDS,
        "Number of service records currently published in the registry."
    );

    Mutex::new(HashMap::new())
});

fn state_value(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    }
}

/// Set (and record) the circuit state gauge for a service.
pub fn set_circuit_breaker_state(service: &str, state: CircuitState) {
    let value = state_value(state);

    if let Ok(mut gauges) = CIRCUIT_STATE_GAUGES.lock() {
        gauges.insert(service.to_string(), value);
    } else {
        tracing::error!("Failed to acquire lock for circuit state gauges");
        return;
    }

    gauge!(JUNCTION_CIRCUIT_BREAKER_STATE, "service" => service.to_string()).set(value);
}

/// Count a circuit breaker transition into `to`.
pub fn record_circuit_breaker_transition(service: &str, to: CircuitState) {
    counter!(
        JUNCTION_CIRCUIT_BREAKER_TRANSITIONS_TOTAL,
        "service" => service.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

/// Count a request shed at ingress.
pub fn record_ingress_rejection() {
    counter!(JUNCTION_INGRESS_REJECTIONS_TOTAL).increment(1);
}

/// Increment the total request counter for an inbound gateway request.
pub fn increment_request_total(service: &str, method: &str, status: u16) {
    counter!(
        JUNCTION_REQUESTS_TOTAL,
        "service" => service.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Increment total count of dispatched backend requests.
pub fn increment_dispatch_total(service: &str, method: &str, status: u16) {
    counter!(
        JUNCTION_DISPATCHES_TOTAL,
        "service" => service.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_request_duration(service: &str, method: &str, duration: std::time::Duration) {
    histogram!(
        JUNCTION_REQUEST_DURATION_SECONDS,
        "service" => service.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set current in-flight request count.
pub fn set_inflight_requests(count: usize) {
    gauge!(JUNCTION_INFLIGHT_REQUESTS).set(count as f64);
}

/// Set the current number of published registry records.
pub fn set_registry_records(count: usize) {
    gauge!(JUNCTION_REGISTRY_RECORDS).set(count as f64);
}

/// RAII helper measuring inbound request duration.
pub struct RequestTimer {
    start: Instant,
    service: String,
    method: String,
}

impl RequestTimer {
    pub fn new(service: &str, method: &str) -> Self {
        Self {
            start: Instant::now(),
            service: service.to_string(),
            method: method.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.service, &self.method, self.start.elapsed());
    }
}

/// Initialize metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    tracing::info!("Initializing Junction metrics system");

    // Force lazy initialization of metrics descriptions
    Lazy::force(&CIRCUIT_STATE_GAUGES);

    tracing::info!("Junction metrics system initialized successfully");
    Ok(())
}

/// Snapshot of per-service circuit state gauges for ad-hoc exports.
pub fn circuit_state_snapshot() -> HashMap<String, f64> {
    CIRCUIT_STATE_GAUGES
        .lock()
        .map(|gauges| gauges.clone())
        .unwrap_or_default()
}
