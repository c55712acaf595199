//! Deterministic per-row transforms with no external IO — the row in, row(s)
//! out shape the engine's retry/audit bracketing is built around.

use elspeth_core::collab::{PluginContext, Transform, TransformResult};
use elspeth_core::model::RowData;
use serde_json::Value;

/// Forwards the row unchanged. The baseline transform for pipelines that
/// only need a pass-through node between a gate and a sink.
pub struct PassthroughTransform;

impl Transform for PassthroughTransform {
    fn process(&mut self, row: RowData, _ctx: &mut PluginContext<'_>) -> TransformResult {
        TransformResult::single(row)
    }
}

/// Uppercases every string value under `field`, leaving other fields and
/// non-string values untouched. Errors (non-retryable) when `field` is
/// missing, to exercise the terminal-failure path in tests.
pub struct UppercaseFieldTransform {
    pub field: String,
}

impl UppercaseFieldTransform {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Transform for UppercaseFieldTransform {
    fn process(&mut self, row: RowData, _ctx: &mut PluginContext<'_>) -> TransformResult {
        let Some(value) = row.get(&self.field) else {
            return TransformResult::error(format!("missing field {:?}", self.field), false);
        };
        let Value::String(s) = value else {
            return TransformResult::single(row);
        };
        let mut out = row.0.clone();
        out.insert(self.field.clone(), Value::String(s.to_uppercase()));
        TransformResult::single(RowData::from(out))
    }
}

/// Fails every call whose `fail_on` field matches `trigger_value`, retryable
/// or not per `retryable` — a fixture for exercising the retry executor and
/// gate/sink failure-routing paths.
pub struct ErrorOnFieldTransform {
    pub fail_on: String,
    pub trigger_value: Value,
    pub retryable: bool,
}

impl Transform for ErrorOnFieldTransform {
    fn process(&mut self, row: RowData, _ctx: &mut PluginContext<'_>) -> TransformResult {
        if row.get(&self.fail_on) == Some(&self.trigger_value) {
            TransformResult::error("triggered failure", self.retryable)
        } else {
            TransformResult::single(row)
        }
    }
}
