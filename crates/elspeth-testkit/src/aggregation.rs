//! A minimal aggregation collaborator: sums a numeric field across the
//! buffered batch and emits a single row. Small enough to drive the
//! count/timeout/condition/end_of_source trigger paths in tests without
//! bringing in any real aggregation semantics.

use elspeth_core::collab::{Aggregation, PluginContext, TransformResult};
use elspeth_core::model::RowData;
use serde_json::{Map, Value};

pub struct SumAggregation {
    pub field: String,
    restored: Option<Value>,
}

impl SumAggregation {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into(), restored: None }
    }
}

impl Aggregation for SumAggregation {
    fn flush(&mut self, rows: Vec<RowData>, _ctx: &mut PluginContext<'_>) -> TransformResult {
        let total: f64 = rows.iter().filter_map(|r| r.get(&self.field)).filter_map(Value::as_f64).sum();
        let mut out = Map::new();
        out.insert("total".to_string(), Value::from(total));
        out.insert("count".to_string(), Value::from(rows.len() as i64));
        TransformResult::single(RowData::from(out))
    }

    fn restore_state(&mut self, state: Value) {
        self.restored = Some(state);
    }

    fn get_restored_state(&self) -> Option<Value> {
        self.restored.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elspeth_core::payload::InlinePayloadStore;
    use elspeth_core::recorder::{InMemoryRecorder, Recorder};
    use serde_json::json;

    #[test]
    fn sums_the_configured_field_across_the_batch() {
        let recorder = InMemoryRecorder::new();
        let store = InlinePayloadStore::new();
        let run_id = recorder.begin_run(json!({}), "v1").unwrap().run_id;
        let node = recorder
            .register_node(
                run_id,
                "sum",
                elspeth_core::model::NodeType::Aggregation,
                "1",
                json!({}),
                elspeth_core::model::Determinism::Pure,
                Some(0),
                None,
            )
            .unwrap();
        let row = recorder.create_row(run_id, node.node_id, 0, &json!({}), None).unwrap();
        let token = recorder.create_token(row.row_id, None, None, None).unwrap();
        let state = recorder.begin_node_state(token.token_id, node.node_id, 0, &json!({}), 0, None).unwrap();
        let mut ctx = PluginContext::new(run_id, state.state_id, &recorder, &store);

        let mut aggregation = SumAggregation::new("n");
        let rows = vec![
            RowData::try_from(json!({"n": 2})).unwrap(),
            RowData::try_from(json!({"n": 5})).unwrap(),
        ];
        let TransformResult::Rows(out) = aggregation.flush(rows, &mut ctx) else { panic!("expected rows") };
        assert_eq!(out[0].get("total"), Some(&json!(7.0)));
        assert_eq!(out[0].get("count"), Some(&json!(2)));
    }

    #[test]
    fn restored_state_round_trips() {
        let mut aggregation = SumAggregation::new("n");
        assert!(aggregation.get_restored_state().is_none());
        aggregation.restore_state(json!({"running_total": 3}));
        assert_eq!(aggregation.get_restored_state(), Some(json!({"running_total": 3})));
    }
}
