//! An in-memory sink that records every row it is asked to write, for
//! assertions in tests and the CLI demo — the simplest possible stand-in for
//! a destination that doesn't touch the filesystem or network.

use elspeth_core::collab::{PluginContext, Sink, SinkWriteResult};
use elspeth_core::model::RowData;
use std::sync::{Arc, Mutex};

/// Shares its captured rows via an `Arc<Mutex<_>>` so a test can hold a
/// handle to inspect them after the sink has been moved into a collaborator
/// map.
#[derive(Clone, Default)]
pub struct CapturingSink {
    rows: Arc<Mutex<Vec<RowData>>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<RowData> {
        self.rows.lock().unwrap().clone()
    }
}

impl Sink for CapturingSink {
    fn write(&mut self, rows: Vec<RowData>, _ctx: &mut PluginContext<'_>) -> SinkWriteResult {
        let batch = serde_json::Value::Array(rows.iter().map(RowData::as_value).collect());
        let count = rows.len();
        self.rows.lock().unwrap().extend(rows);
        SinkWriteResult::Written {
            artifact_path: Some("memory://capturing-sink".to_string()),
            content_hash: elspeth_core::canon::stable_hash(&batch).ok(),
            size_bytes: Some(count as i64),
        }
    }

    fn supports_resume(&self) -> bool {
        true
    }

    fn configure_for_resume(&mut self) -> Result<(), elspeth_core::EngineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elspeth_core::payload::InlinePayloadStore;
    use elspeth_core::recorder::{InMemoryRecorder, Recorder};
    use serde_json::json;

    #[test]
    fn captured_rows_are_visible_through_a_cloned_handle() {
        let recorder = InMemoryRecorder::new();
        let store = InlinePayloadStore::new();
        let run_id = recorder.begin_run(json!({}), "v1").unwrap().run_id;
        let node = recorder
            .register_node(
                run_id,
                "sink",
                elspeth_core::model::NodeType::Sink,
                "1",
                json!({}),
                elspeth_core::model::Determinism::Pure,
                Some(0),
                None,
            )
            .unwrap();
        let row = recorder.create_row(run_id, node.node_id, 0, &json!({"n": 1}), None).unwrap();
        let token = recorder.create_token(row.row_id, None, None, None).unwrap();
        let state = recorder.begin_node_state(token.token_id, node.node_id, 0, &json!({}), 0, None).unwrap();
        let mut ctx = PluginContext::new(run_id, state.state_id, &recorder, &store);

        let sink = CapturingSink::new();
        let handle = sink.clone();
        let mut sink = sink;
        let result = sink.write(vec![RowData::try_from(json!({"n": 1})).unwrap()], &mut ctx);
        assert!(matches!(result, SinkWriteResult::Written { .. }));
        assert_eq!(handle.rows().len(), 1);
    }
}
