use crate::collab::{PluginContext, Transform, TransformResult};
use crate::errors::EngineError;
use crate::model::{NodeId, RowData, RunId, TokenId};
use crate::payload::PayloadStore;
use crate::recorder::Recorder;
use crate::retry::{retry_with_node_states, AttemptOutcome, RetryPolicy};

/// Wraps a [`Transform`] call with NodeState bracketing and retry, per §4.5.
pub struct TransformExecutor<'a> {
    run_id: RunId,
    node_id: NodeId,
    recorder: &'a dyn Recorder,
    payload_store: &'a dyn PayloadStore,
    retry_policy: RetryPolicy,
}

impl<'a> TransformExecutor<'a> {
    pub fn new(
        run_id: RunId,
        node_id: NodeId,
        recorder: &'a dyn Recorder,
        payload_store: &'a dyn PayloadStore,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self { run_id, node_id, recorder, payload_store, retry_policy }
    }

    /// Runs `transform` against `row`, retrying retryable failures per the
    /// configured policy; a non-retryable failure is recorded and returned
    /// immediately without consuming the retry budget. Each attempt opens
    /// its own NodeState (`attempt = k`), so a failed attempt keeps its own
    /// audit record rather than being overwritten by the one that follows
    /// it. Returns the rows the transform produced.
    pub async fn execute(
        &self,
        transform: &mut dyn Transform,
        token_id: TokenId,
        step_index: i64,
        _attempt: i32,
        row: RowData,
    ) -> Result<Vec<RowData>, EngineError> {
        let input_value = row.as_value();
        let transform = std::cell::RefCell::new(transform);
        retry_with_node_states(&self.retry_policy, self.recorder, token_id, self.node_id, step_index, &input_value, |state_id, _k| {
            let row = row.clone();
            let mut transform = transform.borrow_mut();
            async move {
                let mut ctx = PluginContext::new(self.run_id, state_id, self.recorder, self.payload_store);
                let result = if transform.is_batch_aware() { transform.process_batch(vec![row], &mut ctx) } else { transform.process(row, &mut ctx) };
                match classify(result) {
                    Ok(rows) => {
                        let output_value = serde_json::Value::Array(rows.iter().map(RowData::as_value).collect());
                        AttemptOutcome::Success { value: rows, output_json: Some(output_value) }
                    }
                    Err((message, retryable, details)) => AttemptOutcome::Failure { message, retryable, details },
                }
            }
        })
        .await
    }
}

type ClassifiedResult = Result<Vec<RowData>, (String, bool, Option<serde_json::Value>)>;

fn classify(result: TransformResult) -> ClassifiedResult {
    match result {
        TransformResult::Rows(rows) => Ok(rows),
        TransformResult::Pending => Ok(Vec::new()),
        TransformResult::Error { message, retryable, details } => Err((message, retryable, details)),
    }
}
