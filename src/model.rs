//! Core data model.
//!
//! A request is one expression evaluation job. Its identity, expression and
//! creation time never change; its lifecycle (status, result, end time) is
//! written by exactly one worker while the request log keeps reading it.

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Timestamp layout used in every rendered view.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rendered in place of a result or end time that is not known yet.
pub const PLACEHOLDER: &str = "-";

// ---------------------------------------------------------------------------
// Request id
// ---------------------------------------------------------------------------

/// Sequential request id. The first request is `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Submitted, waiting for a free worker.
    Waiting,
    /// Parsed, simulated latency in progress.
    Processing,
    /// Evaluated successfully. Terminal.
    Done,
    /// Expression failed to parse or evaluate. Terminal.
    Rejected,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Waiting, Processing) | (Waiting, Rejected) | (Processing, Done)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Rejected)
    }

    /// Human-readable label shown in request listings.
    pub fn label(self) -> &'static str {
        match self {
            Status::Waiting => "Waiting...",
            Status::Processing => "Processing",
            Status::Done => "OK",
            Status::Rejected => "Bad Request",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Waiting => "waiting",
            Status::Processing => "processing",
            Status::Done => "done",
            Status::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Lifecycle {
    status: Status,
    result: Option<String>,
    end: Option<DateTime<Local>>,
}

/// One evaluation job, shared between the request log and the worker
/// that processes it.
#[derive(Debug)]
pub struct Request {
    id: RequestId,
    expr: String,
    start: DateTime<Local>,
    lifecycle: RwLock<Lifecycle>,
}

impl Request {
    /// A fresh request in the `Waiting` state, stamped with the current time.
    pub fn new(id: RequestId, expr: impl Into<String>) -> Self {
        Self {
            id,
            expr: expr.into(),
            start: Local::now(),
            lifecycle: RwLock::new(Lifecycle {
                status: Status::Waiting,
                result: None,
                end: None,
            }),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn start(&self) -> DateTime<Local> {
        self.start
    }

    pub fn status(&self) -> Status {
        self.lifecycle.read().status
    }

    pub fn result(&self) -> Option<String> {
        self.lifecycle.read().result.clone()
    }

    /// Provisional or actual end time, depending on how far processing got.
    pub fn end(&self) -> Option<DateTime<Local>> {
        self.lifecycle.read().end
    }

    /// `Waiting -> Rejected`. The result stays unset.
    pub fn reject(&self, at: DateTime<Local>) {
        let mut lc = self.lifecycle.write();
        debug_assert!(lc.status.can_transition_to(Status::Rejected));
        lc.status = Status::Rejected;
        lc.end = Some(at);
    }

    /// `Waiting -> Processing`, with the estimated completion time.
    pub fn begin_processing(&self, estimated_end: DateTime<Local>) {
        let mut lc = self.lifecycle.write();
        debug_assert!(lc.status.can_transition_to(Status::Processing));
        lc.status = Status::Processing;
        lc.end = Some(estimated_end);
    }

    /// `Processing -> Done`. Overwrites the estimated end with the actual one.
    pub fn complete(&self, result: String, at: DateTime<Local>) {
        let mut lc = self.lifecycle.write();
        debug_assert!(lc.status.can_transition_to(Status::Done));
        lc.status = Status::Done;
        lc.result = Some(result);
        lc.end = Some(at);
    }

    /// Consistent point-in-time copy for rendering.
    pub fn view(&self) -> RequestView {
        let lc = self.lifecycle.read();
        RequestView {
            id: self.id,
            status: lc.status.label().to_string(),
            result: lc.result.clone().unwrap_or_else(|| PLACEHOLDER.to_string()),
            expr: self.expr.clone(),
            start: self.start.format(TIME_FORMAT).to_string(),
            end: lc
                .end
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        }
    }
}

/// Read-only snapshot of a request, in display form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestView {
    pub id: RequestId,
    pub status: String,
    pub result: String,
    pub expr: String,
    pub start: String,
    pub end: String,
}
