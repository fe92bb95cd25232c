//! Core types for the record store. Domain-agnostic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A JSON object: the single argument or single result of an operation.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A completed invocation as stored. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub seq: i64,
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    /// Qualified operation name, e.g. `TripPlanning.create`.
    pub action: String,
    pub parent_seq: Option<i64>,
    /// Root of the causal chain this record belongs to.
    pub caused_by_seq: Option<i64>,
    pub run_id: String,
    /// Cascade depth: 0 for an externally triggered invocation.
    pub depth: u32,
    pub input: Payload,
    pub output: Payload,
}

impl InvocationRecord {
    /// Domain errors are outputs carrying an `error` field.
    pub fn is_error(&self) -> bool {
        self.output.contains_key("error")
    }
}

/// A record to be appended. The caller builds this; the store assigns seq/id/ts.
#[derive(Debug, Clone)]
pub struct AppendRecord {
    pub action: String,
    pub input: Payload,
    pub output: Payload,
    pub run_id: Option<String>,
    pub depth: u32,
}

impl AppendRecord {
    pub fn new(action: impl Into<String>, input: Payload, output: Payload) -> Self {
        Self {
            action: action.into(),
            input,
            output,
            run_id: None,
            depth: 0,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}
