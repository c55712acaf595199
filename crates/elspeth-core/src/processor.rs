//! The per-token row processor (§4.10): walks a token forward through the
//! configured node chain, expanding on transform/aggregation fan-out and
//! forking on gate branches, until every token reaches a sink or a dead end.
//!
//! Generalizes a single linear step-by-step cursor advance into an explicit
//! work queue so that transform-produced multi-row expansion and gate forks
//! can both feed more work back in without recursion.

use crate::collab::{Aggregation, Sink, Transform};
use crate::errors::EngineError;
use crate::executor::{AggregationExecutor, BufferOutcome, GateExecutor, SinkExecutor, TransformExecutor};
use crate::model::{NodeId, NodeType, RowData, RowId, RunId, TokenId};
use crate::payload::PayloadStore;
use crate::pipeline::PipelineSpec;
use crate::recorder::Recorder;
use crate::retry::RetryPolicy;
use std::collections::{HashMap, VecDeque};

/// A node's collaborator implementation, owned by the caller (the
/// orchestrator) and borrowed mutably for the duration of one `advance` call.
pub enum NodeCollaborator {
    Transform(Box<dyn Transform>),
    Aggregation(Box<dyn Aggregation>),
    Sink(Box<dyn Sink>),
}

struct WorkItem {
    token_id: TokenId,
    row_id: RowId,
    node_id: NodeId,
    row: RowData,
    step_index: i64,
}

pub struct RowProcessor<'a> {
    run_id: RunId,
    pipeline: &'a PipelineSpec,
    recorder: &'a dyn Recorder,
    payload_store: &'a dyn PayloadStore,
    retry_policy: RetryPolicy,
}

impl<'a> RowProcessor<'a> {
    pub fn new(
        run_id: RunId,
        pipeline: &'a PipelineSpec,
        recorder: &'a dyn Recorder,
        payload_store: &'a dyn PayloadStore,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self { run_id, pipeline, recorder, payload_store, retry_policy }
    }

    /// Drives `token_id` forward from `node_id` until the work queue drains:
    /// every descendant token has reached a sink, been buffered inside an
    /// open aggregation batch, or hit a node with no outgoing edge.
    #[allow(clippy::too_many_arguments)]
    pub async fn advance(
        &self,
        collaborators: &mut HashMap<NodeId, NodeCollaborator>,
        aggregation_batches: &mut HashMap<NodeId, AggregationExecutor<'a>>,
        token_id: TokenId,
        row_id: RowId,
        node_id: NodeId,
        row: RowData,
        step_index: i64,
    ) -> Result<(), EngineError> {
        let mut queue = VecDeque::new();
        queue.push_back(WorkItem { token_id, row_id, node_id, row, step_index });

        while let Some(item) = queue.pop_front() {
            let node = self
                .pipeline
                .node(item.node_id)
                .ok_or_else(|| EngineError::Validation(format!("unknown node {}", item.node_id)))?
                .clone();

            match node.node_type {
                NodeType::Gate => {
                    let gate = node
                        .gate
                        .as_ref()
                        .ok_or_else(|| EngineError::Validation("gate node missing its condition config".into()))?;
                    let executor = GateExecutor::new(node.node_id, self.recorder);
                    let edges = executor.execute(gate, &node, item.token_id, item.step_index, 0, &item.row)?;

                    if edges.len() > 1 {
                        let branch_names: Vec<String> = edges.iter().map(|e| e.label.clone()).collect();
                        let children = self.recorder.fork_token(item.token_id, item.row_id, &branch_names)?;
                        for (child, edge) in children.into_iter().zip(edges) {
                            queue.push_back(WorkItem {
                                token_id: child.token_id,
                                row_id: item.row_id,
                                node_id: edge.to_node_id,
                                row: item.row.clone(),
                                step_index: item.step_index + 1,
                            });
                        }
                    } else if let Some(edge) = edges.into_iter().next() {
                        queue.push_back(WorkItem {
                            token_id: item.token_id,
                            row_id: item.row_id,
                            node_id: edge.to_node_id,
                            row: item.row,
                            step_index: item.step_index + 1,
                        });
                    }
                }

                NodeType::Transform => {
                    let collaborator = collaborators
                        .get_mut(&node.node_id)
                        .ok_or_else(|| EngineError::Validation(format!("no collaborator registered for node {}", node.node_id)))?;
                    let NodeCollaborator::Transform(transform) = collaborator else {
                        return Err(EngineError::Validation(format!("node {} is not a transform", node.node_id)));
                    };
                    let executor =
                        TransformExecutor::new(self.run_id, node.node_id, self.recorder, self.payload_store, self.retry_policy);
                    let out_rows =
                        executor.execute(transform.as_mut(), item.token_id, item.step_index, 0, item.row).await?;
                    if let Some(edge) = self.pipeline.default_edge(node.node_id) {
                        for out_row in out_rows {
                            queue.push_back(WorkItem {
                                token_id: item.token_id,
                                row_id: item.row_id,
                                node_id: edge.to_node_id,
                                row: out_row,
                                step_index: item.step_index + 1,
                            });
                        }
                    }
                }

                NodeType::Aggregation => {
                    let collaborator = collaborators
                        .get_mut(&node.node_id)
                        .ok_or_else(|| EngineError::Validation(format!("no collaborator registered for node {}", node.node_id)))?;
                    let NodeCollaborator::Aggregation(aggregation) = collaborator else {
                        return Err(EngineError::Validation(format!("node {} is not an aggregation", node.node_id)));
                    };
                    if !aggregation_batches.contains_key(&node.node_id) {
                        let batch = AggregationExecutor::start_new_batch(
                            self.run_id,
                            node.node_id,
                            self.recorder,
                            self.payload_store,
                            node.flush_triggers.clone(),
                            0,
                        )?;
                        aggregation_batches.insert(node.node_id, batch);
                    }
                    let batch = aggregation_batches.get_mut(&node.node_id).expect("just inserted");
                    let outcome = batch.add(aggregation.as_mut(), item.token_id, item.step_index, 0, item.row)?;
                    if let BufferOutcome::Flushed(out_rows) = outcome {
                        if let Some(edge) = self.pipeline.default_edge(node.node_id) {
                            for out_row in out_rows {
                                queue.push_back(WorkItem {
                                    token_id: item.token_id,
                                    row_id: item.row_id,
                                    node_id: edge.to_node_id,
                                    row: out_row,
                                    step_index: item.step_index + 1,
                                });
                            }
                        }
                        let fresh = AggregationExecutor::start_new_batch(
                            self.run_id,
                            node.node_id,
                            self.recorder,
                            self.payload_store,
                            node.flush_triggers.clone(),
                            0,
                        )?;
                        aggregation_batches.insert(node.node_id, fresh);
                    }
                }

                NodeType::Sink => {
                    let collaborator = collaborators
                        .get_mut(&node.node_id)
                        .ok_or_else(|| EngineError::Validation(format!("no collaborator registered for node {}", node.node_id)))?;
                    let NodeCollaborator::Sink(sink) = collaborator else {
                        return Err(EngineError::Validation(format!("node {} is not a sink", node.node_id)));
                    };
                    let executor =
                        SinkExecutor::new(self.run_id, node.node_id, self.recorder, self.payload_store, self.retry_policy);
                    executor.execute(sink.as_mut(), item.token_id, item.step_index, 0, vec![item.row]).await?;
                }

                NodeType::Source | NodeType::Coalesce => {
                    return Err(EngineError::Validation(format!(
                        "processor cannot advance into a {} node",
                        node.node_type
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{PluginContext, SinkWriteResult, TransformResult};
    use crate::model::{Determinism, EdgeMode};
    use crate::payload::InlinePayloadStore;
    use crate::pipeline::{EdgeSpec, GateConfig, NodeSpec};
    use crate::recorder::InMemoryRecorder;
    use elspeth_gate::Condition;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct UppercaseTransform;

    impl Transform for UppercaseTransform {
        fn process(&mut self, row: RowData, _ctx: &mut PluginContext<'_>) -> TransformResult {
            TransformResult::single(row)
        }
    }

    struct CapturingSink(Arc<Mutex<Vec<RowData>>>);

    impl Sink for CapturingSink {
        fn write(&mut self, rows: Vec<RowData>, _ctx: &mut PluginContext<'_>) -> SinkWriteResult {
            self.0.lock().unwrap().extend(rows);
            SinkWriteResult::written()
        }
    }

    fn new_node(node_id: NodeId, node_type: NodeType, outgoing: Vec<EdgeSpec>, gate: Option<GateConfig>) -> NodeSpec {
        NodeSpec {
            node_id,
            plugin_name: "test".into(),
            node_type,
            determinism: Determinism::Pure,
            sequence_in_pipeline: None,
            outgoing,
            gate,
            flush_triggers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn walks_a_linear_transform_to_sink_chain() {
        let recorder = InMemoryRecorder::new();
        let store = InlinePayloadStore::new();
        let run_id = recorder.begin_run(json!({}), "v1").unwrap().run_id;
        let source_node = recorder
            .register_node(run_id, "src", NodeType::Source, "1", json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        let transform_node = recorder
            .register_node(run_id, "upper", NodeType::Transform, "1", json!({}), Determinism::Pure, Some(1), None)
            .unwrap();
        let sink_node = recorder
            .register_node(run_id, "out", NodeType::Sink, "1", json!({}), Determinism::Pure, Some(2), None)
            .unwrap();
        let edge = recorder
            .register_edge(run_id, transform_node.node_id, sink_node.node_id, "next", EdgeMode::Move)
            .unwrap();

        let pipeline = PipelineSpec {
            nodes: vec![
                new_node(
                    transform_node.node_id,
                    NodeType::Transform,
                    vec![EdgeSpec { edge_id: edge.edge_id, label: "next".into(), mode: EdgeMode::Move, to_node_id: sink_node.node_id }],
                    None,
                ),
                new_node(sink_node.node_id, NodeType::Sink, vec![], None),
            ],
        };

        let sink_output = Arc::new(Mutex::new(Vec::new()));
        let mut collaborators: HashMap<NodeId, NodeCollaborator> = HashMap::new();
        collaborators.insert(transform_node.node_id, NodeCollaborator::Transform(Box::new(UppercaseTransform)));
        collaborators.insert(sink_node.node_id, NodeCollaborator::Sink(Box::new(CapturingSink(sink_output.clone()))));

        let processor = RowProcessor::new(run_id, &pipeline, &recorder, &store, RetryPolicy::default());
        let row = recorder.create_row(run_id, source_node.node_id, 0, &json!({"n": 1}), None).unwrap();
        let token = recorder.create_token(row.row_id, None, None, None).unwrap();
        let row_data = RowData::try_from(json!({"n": 1})).unwrap();

        processor
            .advance(&mut collaborators, &mut HashMap::new(), token.token_id, row.row_id, transform_node.node_id, row_data, 0)
            .await
            .unwrap();

        assert_eq!(sink_output.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn a_copy_mode_gate_fork_reaches_both_sinks() {
        let recorder = InMemoryRecorder::new();
        let store = InlinePayloadStore::new();
        let run_id = recorder.begin_run(json!({}), "v1").unwrap().run_id;
        let source_node = recorder
            .register_node(run_id, "src", NodeType::Source, "1", json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        let gate_node = recorder
            .register_node(run_id, "gate", NodeType::Gate, "1", json!({}), Determinism::Pure, Some(1), None)
            .unwrap();
        let sink_a = recorder
            .register_node(run_id, "a", NodeType::Sink, "1", json!({}), Determinism::Pure, Some(2), None)
            .unwrap();
        let sink_b = recorder
            .register_node(run_id, "b", NodeType::Sink, "1", json!({}), Determinism::Pure, Some(3), None)
            .unwrap();
        let edge_a = recorder.register_edge(run_id, gate_node.node_id, sink_a.node_id, "a", EdgeMode::Copy).unwrap();
        let edge_b = recorder.register_edge(run_id, gate_node.node_id, sink_b.node_id, "b", EdgeMode::Copy).unwrap();

        let pipeline = PipelineSpec {
            nodes: vec![
                new_node(
                    gate_node.node_id,
                    NodeType::Gate,
                    vec![
                        EdgeSpec { edge_id: edge_a.edge_id, label: "a".into(), mode: EdgeMode::Copy, to_node_id: sink_a.node_id },
                        EdgeSpec { edge_id: edge_b.edge_id, label: "b".into(), mode: EdgeMode::Copy, to_node_id: sink_b.node_id },
                    ],
                    Some(GateConfig { condition: Condition::Always(true), on_true: vec!["a".into(), "b".into()], on_false: vec![] }),
                ),
                new_node(sink_a.node_id, NodeType::Sink, vec![], None),
                new_node(sink_b.node_id, NodeType::Sink, vec![], None),
            ],
        };

        let out_a = Arc::new(Mutex::new(Vec::new()));
        let out_b = Arc::new(Mutex::new(Vec::new()));
        let mut collaborators: HashMap<NodeId, NodeCollaborator> = HashMap::new();
        collaborators.insert(sink_a.node_id, NodeCollaborator::Sink(Box::new(CapturingSink(out_a.clone()))));
        collaborators.insert(sink_b.node_id, NodeCollaborator::Sink(Box::new(CapturingSink(out_b.clone()))));

        let processor = RowProcessor::new(run_id, &pipeline, &recorder, &store, RetryPolicy::default());
        let row = recorder.create_row(run_id, source_node.node_id, 0, &json!({"n": 1}), None).unwrap();
        let token = recorder.create_token(row.row_id, None, None, None).unwrap();
        let row_data = RowData::try_from(json!({"n": 1})).unwrap();

        processor
            .advance(&mut collaborators, &mut HashMap::new(), token.token_id, row.row_id, gate_node.node_id, row_data, 0)
            .await
            .unwrap();

        assert_eq!(out_a.lock().unwrap().len(), 1);
        assert_eq!(out_b.lock().unwrap().len(), 1);
    }
}
