use crate::errors::EngineError;
use crate::model::{CallStatus, NodeId, RunId, StateId};
use crate::payload::PayloadStore;
use crate::recorder::Recorder;
use serde_json::Value;

/// Handed to every collaborator call so it can record outbound calls and
/// recover aggregation state without touching the recorder directly.
pub struct PluginContext<'a> {
    pub run_id: RunId,
    pub state_id: StateId,
    recorder: &'a dyn Recorder,
    payload_store: &'a dyn PayloadStore,
    restored_aggregation_state: Option<&'a Value>,
}

impl<'a> PluginContext<'a> {
    pub fn new(
        run_id: RunId,
        state_id: StateId,
        recorder: &'a dyn Recorder,
        payload_store: &'a dyn PayloadStore,
    ) -> Self {
        Self { run_id, state_id, recorder, payload_store, restored_aggregation_state: None }
    }

    pub fn with_restored_state(mut self, state: Option<&'a Value>) -> Self {
        self.restored_aggregation_state = state;
        self
    }

    /// Records a call a collaborator makes to an external system (an LLM, an
    /// HTTP API, a database) as part of handling the current row.
    pub fn record_call(
        &self,
        call_type: &str,
        status: CallStatus,
        request_data: Option<&Value>,
        response_data: Option<&Value>,
        error: Option<Value>,
        latency_ms: Option<i64>,
    ) -> Result<(), EngineError> {
        self.recorder
            .record_call(self.state_id, call_type, status, request_data, response_data, error, latency_ms)
            .map(|_| ())
    }

    /// State an aggregation previously checkpointed for `node_id`, if any
    /// (§4.12's resume path feeds this back to `Aggregation::restore_state`).
    pub fn restored_state_for(&self, _node_id: NodeId) -> Option<&Value> {
        self.restored_aggregation_state
    }

    pub fn payload_store(&self) -> &dyn PayloadStore {
        self.payload_store
    }
}
