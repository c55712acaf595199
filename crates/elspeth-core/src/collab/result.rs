use crate::model::RowData;
use serde_json::Value;

/// What a [`super::Transform`] or [`super::Aggregation`] call produced
/// (§4.5/§4.7). `Pending` is how an aggregation signals it has buffered the
/// row but has nothing to emit yet (the `BatchPendingError` convention
/// recorded as `context_after_json.pending = true`, not a terminal error).
pub enum TransformResult {
    Rows(Vec<RowData>),
    Pending,
    Error { message: String, retryable: bool, details: Option<Value> },
}

impl TransformResult {
    pub fn single(row: RowData) -> Self {
        TransformResult::Rows(vec![row])
    }

    pub fn error(message: impl Into<String>, retryable: bool) -> Self {
        TransformResult::Error { message: message.into(), retryable, details: None }
    }
}

/// What a [`super::Sink`] call produced (§4.8).
pub enum SinkWriteResult {
    Written { artifact_path: Option<String>, content_hash: Option<String>, size_bytes: Option<i64> },
    Error { message: String, retryable: bool, details: Option<Value> },
}

impl SinkWriteResult {
    pub fn written() -> Self {
        SinkWriteResult::Written { artifact_path: None, content_hash: None, size_bytes: None }
    }

    pub fn error(message: impl Into<String>, retryable: bool) -> Self {
        SinkWriteResult::Error { message: message.into(), retryable, details: None }
    }
}
