//! The engine's error taxonomy (§7): kinds, not type names.

use crate::model::InvalidEnumValue;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration or schema violation detected before or at node
    /// registration; terminal at run start.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transient plugin failure (network, 5xx, timeout); retried per the
    /// retry manager before becoming terminal.
    #[error("retryable plugin error: {0}")]
    PluginRetryable(String),

    /// Semantic plugin failure (bad input, auth); routed to the failure
    /// destination or aborts the row.
    #[error("terminal plugin error: {0}")]
    PluginTerminal(String),

    /// Rate-limit signal raised inside pooled execution.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// Aggregation result is not yet available; the token suspends at that
    /// node rather than failing.
    #[error("batch pending: {0}")]
    BatchPending(String),

    /// Audit store failure. Fatal to the run: no silent audit loss.
    #[error("recorder error: {0}")]
    Recorder(String),

    /// The process was killed mid-run; discovered on the next start by runs
    /// left in `running` and batches left in `executing`.
    #[error("crash recovery needed for run {0}")]
    CrashRecoveryNeeded(String),
}

impl From<InvalidEnumValue> for EngineError {
    fn from(e: InvalidEnumValue) -> Self {
        EngineError::Validation(e.to_string())
    }
}

impl From<crate::canon::CanonError> for EngineError {
    fn from(e: crate::canon::CanonError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

/// A structured reason for a terminal or retryable plugin failure, carried
/// alongside [`EngineError`] variants so it can be stored verbatim in
/// `node_states.error_json` / `calls.error_json` (§7: "the full story lives
/// in node_states.error_json plus calls.error_json").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorReason {
    pub message: String,
    pub retryable: bool,
    pub details: Option<Value>,
}

impl ErrorReason {
    pub fn terminal(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false, details: None }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: true, details: None }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("ErrorReason is always serializable")
    }
}
