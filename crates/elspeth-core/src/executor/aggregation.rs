use crate::collab::{Aggregation, PluginContext, TransformResult};
use crate::errors::{EngineError, ErrorReason};
use crate::model::{BatchId, BatchStatus, NodeId, NodeStateStatus, RowData, RunId, TokenId};
use crate::payload::PayloadStore;
use crate::pipeline::FlushTrigger;
use crate::recorder::Recorder;
use elspeth_gate::Condition;
use std::time::Instant;

/// Buffers tokens for one aggregation node and flushes them through an
/// [`Aggregation`] collaborator when a trigger fires (§4.7).
///
/// One instance owns one in-progress [`crate::model::Batch`]; a fresh
/// instance (or [`Self::start_new_batch`]) is used for the next one.
pub struct AggregationExecutor<'a> {
    run_id: RunId,
    node_id: NodeId,
    recorder: &'a dyn Recorder,
    payload_store: &'a dyn PayloadStore,
    triggers: Vec<FlushTrigger>,
    batch_id: BatchId,
    buffered_tokens: Vec<TokenId>,
    buffered_rows: Vec<RowData>,
    batch_started_at: Instant,
}

pub enum BufferOutcome {
    /// The row was buffered; no flush fired yet.
    Buffered,
    /// A trigger fired and the aggregation was invoked.
    Flushed(Vec<RowData>),
}

impl<'a> AggregationExecutor<'a> {
    pub fn start_new_batch(
        run_id: RunId,
        node_id: NodeId,
        recorder: &'a dyn Recorder,
        payload_store: &'a dyn PayloadStore,
        triggers: Vec<FlushTrigger>,
        attempt: i32,
    ) -> Result<Self, EngineError> {
        let batch = recorder.create_batch(run_id, node_id, attempt)?;
        Ok(Self {
            run_id,
            node_id,
            recorder,
            payload_store,
            triggers,
            batch_id: batch.batch_id,
            buffered_tokens: Vec::new(),
            buffered_rows: Vec::new(),
            batch_started_at: Instant::now(),
        })
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn is_empty(&self) -> bool {
        self.buffered_rows.is_empty()
    }

    /// The token a representative NodeState flush row attaches to when no
    /// new token triggers the flush (the end-of-source path).
    pub fn representative_token(&self) -> Option<TokenId> {
        self.buffered_tokens.first().copied()
    }

    /// Adds one row/token to the batch and evaluates count/timeout/condition
    /// triggers. An `end_of_source` trigger is only ever checked via
    /// [`Self::flush_end_of_source`], since it cannot fire per-row.
    pub fn add(
        &mut self,
        aggregation: &mut dyn Aggregation,
        token_id: TokenId,
        step_index: i64,
        attempt: i32,
        row: RowData,
    ) -> Result<BufferOutcome, EngineError> {
        if self.buffered_tokens.is_empty() {
            self.recorder.update_batch_status(self.batch_id, BatchStatus::Executing, None, None)?;
        }
        let ordinal = self.buffered_tokens.len() as i32;
        self.recorder.add_batch_member(self.batch_id, token_id, ordinal)?;
        self.buffered_tokens.push(token_id);
        let row_value = row.as_value();
        self.buffered_rows.push(row);

        for trigger in self.triggers.clone() {
            let fired = match &trigger {
                FlushTrigger::Count(n) => self.buffered_rows.len() >= *n,
                FlushTrigger::Timeout(d) => self.batch_started_at.elapsed() >= *d,
                FlushTrigger::Condition(cond) => matches!(cond_fires(cond, &row_value), Ok(true)),
                FlushTrigger::EndOfSource => false,
            };
            if fired {
                let reason = trigger_reason(&trigger);
                let rows = self.flush(aggregation, token_id, step_index, attempt, reason)?;
                return Ok(BufferOutcome::Flushed(rows));
            }
        }
        Ok(BufferOutcome::Buffered)
    }

    /// Forces a flush because the source is exhausted, regardless of whether
    /// a count/timeout/condition trigger has fired.
    pub fn flush_end_of_source(
        &mut self,
        aggregation: &mut dyn Aggregation,
        representative_token: TokenId,
        step_index: i64,
        attempt: i32,
    ) -> Result<Vec<RowData>, EngineError> {
        if self.buffered_rows.is_empty() {
            self.recorder.update_batch_status(self.batch_id, BatchStatus::Completed, Some("end_of_source".into()), None)?;
            return Ok(Vec::new());
        }
        self.flush(aggregation, representative_token, step_index, attempt, "end_of_source")
    }

    fn flush(
        &mut self,
        aggregation: &mut dyn Aggregation,
        representative_token: TokenId,
        step_index: i64,
        attempt: i32,
        trigger_reason: &str,
    ) -> Result<Vec<RowData>, EngineError> {
        let input_value = serde_json::Value::Array(self.buffered_rows.iter().map(|r| r.as_value()).collect());
        let state = self.recorder.begin_node_state(
            representative_token,
            self.node_id,
            step_index,
            &input_value,
            attempt,
            None,
        )?;
        let started = Instant::now();
        let rows = std::mem::take(&mut self.buffered_rows);
        let mut ctx = PluginContext::new(self.run_id, state.state_id, self.recorder, self.payload_store);
        let result = aggregation.flush(rows, &mut ctx);
        let duration_ms = started.elapsed().as_millis() as i64;

        match result {
            TransformResult::Rows(out_rows) => {
                let output_value = serde_json::Value::Array(out_rows.iter().map(|r| r.as_value()).collect());
                self.recorder.complete_node_state(
                    state.state_id,
                    NodeStateStatus::Completed,
                    Some(&output_value),
                    Some(duration_ms),
                    None,
                    None,
                )?;
                self.recorder.update_batch_status(
                    self.batch_id,
                    BatchStatus::Completed,
                    Some(trigger_reason.to_string()),
                    Some(state.state_id),
                )?;
                self.buffered_tokens.clear();
                Ok(out_rows)
            }
            TransformResult::Pending => {
                self.recorder.complete_node_state(
                    state.state_id,
                    NodeStateStatus::Completed,
                    None,
                    Some(duration_ms),
                    None,
                    Some(serde_json::json!({"pending": true})),
                )?;
                Ok(Vec::new())
            }
            TransformResult::Error { message, retryable, details } => {
                let mut reason = ErrorReason::terminal(message.clone());
                reason.retryable = retryable;
                if let Some(details) = details {
                    reason = reason.with_details(details);
                }
                self.recorder.complete_node_state(
                    state.state_id,
                    NodeStateStatus::Failed,
                    None,
                    Some(duration_ms),
                    Some(reason.to_json()),
                    None,
                )?;
                self.recorder.update_batch_status(
                    self.batch_id,
                    BatchStatus::Failed,
                    Some(trigger_reason.to_string()),
                    Some(state.state_id),
                )?;
                if retryable {
                    Err(EngineError::PluginRetryable(message))
                } else {
                    Err(EngineError::PluginTerminal(message))
                }
            }
        }
    }
}

fn cond_fires(condition: &Condition, row: &serde_json::Value) -> Result<bool, elspeth_gate::GateError> {
    condition.eval(row)
}

fn trigger_reason(trigger: &FlushTrigger) -> &'static str {
    match trigger {
        FlushTrigger::Count(_) => "count",
        FlushTrigger::Timeout(_) => "timeout",
        FlushTrigger::Condition(_) => "condition",
        FlushTrigger::EndOfSource => "end_of_source",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Determinism;
    use crate::payload::InlinePayloadStore;
    use crate::recorder::InMemoryRecorder;
    use serde_json::json;

    struct SumAggregation;

    impl Aggregation for SumAggregation {
        fn flush(&mut self, rows: Vec<RowData>, _ctx: &mut PluginContext<'_>) -> TransformResult {
            let total: i64 = rows.iter().filter_map(|r| r.get("n").and_then(|v| v.as_i64())).sum();
            let mut out = serde_json::Map::new();
            out.insert("total".to_string(), json!(total));
            TransformResult::single(RowData::from(out))
        }
    }

    fn setup(recorder: &InMemoryRecorder) -> (RunId, NodeId) {
        let run_id = recorder.begin_run(json!({}), "v1").unwrap().run_id;
        let node = recorder
            .register_node(run_id, "sum", crate::model::NodeType::Aggregation, "1", json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        (run_id, node.node_id)
    }

    fn token_for(recorder: &InMemoryRecorder, run_id: RunId, node_id: NodeId, idx: i64) -> TokenId {
        let row = recorder.create_row(run_id, node_id, idx, &json!({"n": idx}), None).unwrap();
        recorder.create_token(row.row_id, None, None, None).unwrap().token_id
    }

    #[test]
    fn count_trigger_flushes_once_the_threshold_is_reached() {
        let recorder = InMemoryRecorder::new();
        let (run_id, node_id) = setup(&recorder);
        let store = InlinePayloadStore::new();
        let mut batch =
            AggregationExecutor::start_new_batch(run_id, node_id, &recorder, &store, vec![FlushTrigger::Count(3)], 0).unwrap();
        let mut aggregation = SumAggregation;

        for i in 0..2 {
            let token_id = token_for(&recorder, run_id, node_id, i);
            let row = RowData::try_from(json!({"n": i})).unwrap();
            let outcome = batch.add(&mut aggregation, token_id, 0, 0, row).unwrap();
            assert!(matches!(outcome, BufferOutcome::Buffered));
        }

        let token_id = token_for(&recorder, run_id, node_id, 2);
        let row = RowData::try_from(json!({"n": 2})).unwrap();
        let outcome = batch.add(&mut aggregation, token_id, 0, 0, row).unwrap();
        match outcome {
            BufferOutcome::Flushed(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].get("total"), Some(&json!(3)));
            }
            BufferOutcome::Buffered => panic!("expected the count trigger to fire"),
        }
    }

    #[test]
    fn end_of_source_flush_on_an_empty_batch_produces_nothing() {
        let recorder = InMemoryRecorder::new();
        let (run_id, node_id) = setup(&recorder);
        let store = InlinePayloadStore::new();
        let mut batch =
            AggregationExecutor::start_new_batch(run_id, node_id, &recorder, &store, vec![FlushTrigger::EndOfSource], 0).unwrap();
        let mut aggregation = SumAggregation;
        let representative = token_for(&recorder, run_id, node_id, 0);

        let rows = batch.flush_end_of_source(&mut aggregation, representative, 0, 0).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn end_of_source_flush_drains_a_partial_batch() {
        let recorder = InMemoryRecorder::new();
        let (run_id, node_id) = setup(&recorder);
        let store = InlinePayloadStore::new();
        let mut batch =
            AggregationExecutor::start_new_batch(run_id, node_id, &recorder, &store, vec![FlushTrigger::Count(10)], 0).unwrap();
        let mut aggregation = SumAggregation;

        let token_id = token_for(&recorder, run_id, node_id, 0);
        let row = RowData::try_from(json!({"n": 7})).unwrap();
        batch.add(&mut aggregation, token_id, 0, 0, row).unwrap();

        let rows = batch.flush_end_of_source(&mut aggregation, token_id, 0, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("total"), Some(&json!(7)));
    }
}
