//! The per-request routine a worker runs: evaluate, simulate latency,
//! finalize.

use crate::config::ConfigStore;
use crate::eval::{evaluate, format_result};
use crate::model::{Request, Status};
use crate::telemetry::metrics;
use crate::telemetry::request::{record_state_transition, start_request_span};
use chrono::Local;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{Instrument, info, warn};

/// Simulated processing time for `expr`.
///
/// Every character that is itself a configured key adds that key's value in
/// milliseconds, once per occurrence. Other characters cost nothing.
pub fn simulated_latency(expr: &str, costs: &HashMap<String, u64>) -> Duration {
    let mut buf = [0u8; 4];
    let total_ms = expr
        .chars()
        .filter_map(|c| costs.get(&*c.encode_utf8(&mut buf)).copied())
        .fold(0u64, u64::saturating_add);
    Duration::from_millis(total_ms)
}

/// Run one request to a terminal state. Never fails: a bad expression ends
/// in `Rejected`.
pub async fn process(request: &Request, store: &ConfigStore, worker_id: usize) {
    let span = start_request_span(request.id(), request.expr(), worker_id);

    async {
        let value = match evaluate(request.expr()) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "expression rejected");
                request.reject(Local::now());
                record_state_transition(&span, Status::Waiting, Status::Rejected);
                return;
            }
        };

        let latency = simulated_latency(request.expr(), &store.lookup_table());
        let now = Local::now();
        let estimated_end = chrono::Duration::from_std(latency)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        request.begin_processing(estimated_end);
        record_state_transition(&span, Status::Waiting, Status::Processing);
        metrics::simulated_latency_ms().record(latency.as_secs_f64() * 1000.0, &[]);

        info!(latency_ms = latency.as_millis() as u64, "expression solving");
        tokio::time::sleep(latency).await;

        // The actual end replaces the estimate; they differ by scheduling jitter.
        request.complete(format_result(value), Local::now());
        record_state_transition(&span, Status::Processing, Status::Done);
        info!("expression solved");
    }
    .instrument(span.clone())
    .await
}
