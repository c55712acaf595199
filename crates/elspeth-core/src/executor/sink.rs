use crate::collab::{PluginContext, Sink, SinkWriteResult};
use crate::errors::EngineError;
use crate::model::{NodeId, RowData, RunId, TokenId};
use crate::payload::PayloadStore;
use crate::recorder::Recorder;
use crate::retry::{retry_with_node_states, AttemptOutcome, RetryPolicy};

/// Wraps a [`Sink`] write with NodeState bracketing, retry and artifact
/// registration (§4.8). A non-`fail_row` validation error at a sink routes
/// to the node's configured failure destination if one exists, and
/// otherwise marks the row's NodeState failed without aborting the run —
/// the executor itself always returns the terminal error; routing-on-failure
/// is the processor's job, since only it knows the node's failure edge.
pub struct SinkExecutor<'a> {
    run_id: RunId,
    node_id: NodeId,
    recorder: &'a dyn Recorder,
    payload_store: &'a dyn PayloadStore,
    retry_policy: RetryPolicy,
}

impl<'a> SinkExecutor<'a> {
    pub fn new(
        run_id: RunId,
        node_id: NodeId,
        recorder: &'a dyn Recorder,
        payload_store: &'a dyn PayloadStore,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self { run_id, node_id, recorder, payload_store, retry_policy }
    }

    /// Writes `rows` via `sink`, retrying retryable failures per the
    /// configured policy. Each attempt opens its own NodeState, so a failed
    /// write before a later success keeps its own audit record.
    pub async fn execute(
        &self,
        sink: &mut dyn Sink,
        token_id: TokenId,
        step_index: i64,
        _attempt: i32,
        rows: Vec<RowData>,
    ) -> Result<(), EngineError> {
        let input_value = serde_json::Value::Array(rows.iter().map(|r| r.as_value()).collect());
        let sink = std::cell::RefCell::new(sink);
        retry_with_node_states(&self.retry_policy, self.recorder, token_id, self.node_id, step_index, &input_value, |state_id, _k| {
            let rows = rows.clone();
            let mut sink = sink.borrow_mut();
            async move {
                let mut ctx = PluginContext::new(self.run_id, state_id, self.recorder, self.payload_store);
                match sink.write(rows, &mut ctx) {
                    SinkWriteResult::Written { artifact_path, content_hash, size_bytes } => {
                        if let (Some(path), Some(hash), Some(size)) = (artifact_path, content_hash, size_bytes) {
                            if let Err(err) = self.recorder.register_artifact(
                                self.run_id,
                                state_id,
                                self.node_id,
                                "sink_output",
                                &path,
                                &hash,
                                size,
                            ) {
                                return AttemptOutcome::Failure {
                                    message: err.to_string(),
                                    retryable: false,
                                    details: None,
                                };
                            }
                        }
                        AttemptOutcome::Success { value: (), output_json: None }
                    }
                    SinkWriteResult::Error { message, retryable, details } => {
                        AttemptOutcome::Failure { message, retryable, details }
                    }
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Determinism, NodeType, NodeStateStatus};
    use crate::payload::InlinePayloadStore;
    use crate::recorder::InMemoryRecorder;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn setup() -> (InMemoryRecorder, InlinePayloadStore, RunId, NodeId, TokenId) {
        let recorder = InMemoryRecorder::new();
        let run_id = recorder.begin_run(json!({}), "v1").unwrap().run_id;
        let node = recorder
            .register_node(run_id, "out", NodeType::Sink, "1", json!({}), Determinism::IoRead, Some(0), None)
            .unwrap();
        let row = recorder.create_row(run_id, node.node_id, 0, &json!({"n": 1}), None).unwrap();
        let token = recorder.create_token(row.row_id, None, None, None).unwrap();
        (recorder, InlinePayloadStore::new(), run_id, node.node_id, token.token_id)
    }

    struct CapturingSink;

    impl Sink for CapturingSink {
        fn write(&mut self, rows: Vec<RowData>, _ctx: &mut PluginContext<'_>) -> SinkWriteResult {
            SinkWriteResult::Written {
                artifact_path: Some("out.jsonl".into()),
                content_hash: Some("deadbeef".into()),
                size_bytes: Some(rows.len() as i64),
            }
        }
    }

    struct FailingSink;

    impl Sink for FailingSink {
        fn write(&mut self, _rows: Vec<RowData>, _ctx: &mut PluginContext<'_>) -> SinkWriteResult {
            SinkWriteResult::error("disk full", false)
        }
    }

    struct FlakySink {
        calls: AtomicU32,
        succeed_on_call: u32,
    }

    impl Sink for FlakySink {
        fn write(&mut self, _rows: Vec<RowData>, _ctx: &mut PluginContext<'_>) -> SinkWriteResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call + 1 < self.succeed_on_call {
                SinkWriteResult::error("connection reset", true)
            } else {
                SinkWriteResult::Written { artifact_path: Some("out.jsonl".into()), content_hash: Some("deadbeef".into()), size_bytes: Some(1) }
            }
        }
    }

    #[tokio::test]
    async fn a_successful_write_registers_an_artifact() {
        let (recorder, store, run_id, node_id, token_id) = setup();
        let executor = SinkExecutor::new(run_id, node_id, &recorder, &store, RetryPolicy::default());
        let mut sink = CapturingSink;
        let row = RowData::try_from(json!({"n": 1})).unwrap();

        executor.execute(&mut sink, token_id, 0, 0, vec![row]).await.unwrap();
        let states = recorder.get_node_states(token_id).unwrap();
        assert_eq!(states.len(), 1);
        assert!(matches!(states[0].status, NodeStateStatus::Completed));
    }

    #[tokio::test]
    async fn a_failing_write_marks_the_node_state_failed_and_returns_terminal() {
        let (recorder, store, run_id, node_id, token_id) = setup();
        let executor = SinkExecutor::new(run_id, node_id, &recorder, &store, RetryPolicy::default());
        let mut sink = FailingSink;
        let row = RowData::try_from(json!({"n": 1})).unwrap();

        let err = executor.execute(&mut sink, token_id, 0, 0, vec![row]).await.unwrap_err();
        assert!(matches!(err, EngineError::PluginTerminal(_)));
        let states = recorder.get_node_states(token_id).unwrap();
        assert!(matches!(states[0].status, NodeStateStatus::Failed));
    }

    #[tokio::test]
    async fn retries_a_retryable_write_until_it_succeeds() {
        let (recorder, store, run_id, node_id, token_id) = setup();
        let policy = RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2) };
        let executor = SinkExecutor::new(run_id, node_id, &recorder, &store, policy);
        let mut sink = FlakySink { calls: AtomicU32::new(0), succeed_on_call: 2 };
        let row = RowData::try_from(json!({"n": 1})).unwrap();

        executor.execute(&mut sink, token_id, 0, 0, vec![row]).await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        let states = recorder.get_node_states(token_id).unwrap();
        assert_eq!(states.len(), 2);
        assert!(matches!(states[0].status, NodeStateStatus::Failed));
        assert!(matches!(states[1].status, NodeStateStatus::Completed));
    }

    #[tokio::test]
    async fn exhausting_the_retry_budget_returns_a_retryable_error() {
        let (recorder, store, run_id, node_id, token_id) = setup();
        let policy = RetryPolicy { max_attempts: 2, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2) };
        let executor = SinkExecutor::new(run_id, node_id, &recorder, &store, policy);
        let mut sink = FlakySink { calls: AtomicU32::new(0), succeed_on_call: 10 };
        let row = RowData::try_from(json!({"n": 1})).unwrap();

        let err = executor.execute(&mut sink, token_id, 0, 0, vec![row]).await.unwrap_err();
        assert!(matches!(err, EngineError::PluginRetryable(_)));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        let states = recorder.get_node_states(token_id).unwrap();
        assert_eq!(states.len(), 2);
    }
}
