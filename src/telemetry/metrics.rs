//! Metric instruments, built from the globally-registered `MeterProvider`.
//!
//! Without an OTLP endpoint the global provider is a no-op, so recording is
//! always safe.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("calcq")
}

/// Counter: expressions submitted.
pub fn requests_submitted() -> Counter<u64> {
    meter()
        .u64_counter("calcq.requests.submitted")
        .with_description("Number of expressions submitted")
        .build()
}

/// Counter: request lifecycle transitions.
/// Labels: `from`, `to`.
pub fn state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("calcq.requests.state_transitions")
        .with_description("Number of request state transitions")
        .build()
}

/// Counter: worker tasks started by reconciliation.
pub fn workers_spawned() -> Counter<u64> {
    meter()
        .u64_counter("calcq.pool.workers_spawned")
        .with_description("Worker tasks spawned")
        .build()
}

/// Counter: stop signals delivered to workers.
pub fn workers_retired() -> Counter<u64> {
    meter()
        .u64_counter("calcq.pool.workers_retired")
        .with_description("Worker tasks retired")
        .build()
}

/// Counter: configuration edit pairs.
/// Labels: `result` ("applied" | "rejected").
pub fn config_edits() -> Counter<u64> {
    meter()
        .u64_counter("calcq.config.edits")
        .with_description("Configuration edit pairs by outcome")
        .build()
}

/// Histogram: simulated latency per accepted request.
pub fn simulated_latency_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("calcq.request.simulated_latency_ms")
        .with_description("Simulated processing latency")
        .with_unit("ms")
        .build()
}
