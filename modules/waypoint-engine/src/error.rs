//! Engine-class errors: programming mistakes and runaway cascades.
//!
//! Domain failures are not errors here; they are outputs carrying an
//! `error` field and flow through rules like any other data.

use thiserror::Error;

use crate::vars::Var;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown concept: {0}")]
    UnknownConcept(String),

    #[error("concept already registered: {0}")]
    DuplicateConcept(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("unknown query: {0}")]
    UnknownQuery(String),

    #[error("field '{field}' is not declared by {action}")]
    UnknownField { action: String, field: String },

    #[error("variable {var} ({name}) is unbound")]
    UnboundVariable { var: Var, name: String },

    #[error("cascade depth {depth} exceeds limit {limit} at {action}")]
    DepthExceeded {
        action: String,
        depth: u32,
        limit: u32,
    },

    #[error("cycle detected: {action} re-invoked with identical input")]
    CycleDetected { action: String },

    #[error("callback failed: {0}")]
    Callback(String),

    #[error("operation {action} failed: {message}")]
    OperationFailed { action: String, message: String },

    #[error("record {seq} belongs to run {record_run}, not {run}")]
    ForeignRecord {
        seq: i64,
        record_run: String,
        run: String,
    },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl EngineError {
    /// Unbound variable with no name available at the failure site.
    pub(crate) fn unbound(var: Var) -> Self {
        EngineError::UnboundVariable {
            var,
            name: var.to_string(),
        }
    }
}
