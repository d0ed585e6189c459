use serde::{Deserialize, Serialize};

/// Distributed trace coordinates captured when a failure report arrives.
///
/// Replayed messages reuse these so the redelivery shows up in the same
/// trace as the original processing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceContext {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
        }
    }
}
