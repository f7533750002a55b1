//! Request processing span helpers.

use crate::model::{RequestId, Status};
use tracing::Span;

/// Start a span covering one request's trip through a worker.
///
/// `request.status` is declared empty and filled in by
/// [`record_state_transition`].
pub fn start_request_span(request_id: RequestId, expr: &str, worker_id: usize) -> Span {
    tracing::info_span!(
        "request.process",
        "request.id" = request_id.0,
        "request.expr" = expr,
        "worker.id" = worker_id,
        "request.status" = tracing::field::Empty,
    )
}

/// Record a lifecycle transition on the span and bump the transition counter.
pub fn record_state_transition(span: &Span, from: Status, to: Status) {
    span.record("request.status", tracing::field::display(to));
    span.in_scope(|| {
        tracing::info!(%from, %to, "state_transition");
    });
    super::metrics::state_transitions().add(
        1,
        &[
            opentelemetry::KeyValue::new("from", from.to_string()),
            opentelemetry::KeyValue::new("to", to.to_string()),
        ],
    );
}
