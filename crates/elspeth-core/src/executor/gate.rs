use crate::errors::EngineError;
use crate::model::{NodeId, NodeStateStatus, RowData, TokenId};
use crate::pipeline::{EdgeSpec, GateConfig, NodeSpec};
use crate::recorder::{Recorder, Route};
use elspeth_gate::{evaluate, RoutingReason};

/// Wraps a config-driven gate condition with NodeState and routing-event
/// bracketing (§4.6). The executor never evaluates the condition itself —
/// that is `elspeth_gate::evaluate`'s job — it only records the decision.
pub struct GateExecutor<'a> {
    node_id: NodeId,
    recorder: &'a dyn Recorder,
}

impl<'a> GateExecutor<'a> {
    pub fn new(node_id: NodeId, recorder: &'a dyn Recorder) -> Self {
        Self { node_id, recorder }
    }

    /// Evaluates `gate.condition` against `row`, selects the `on_true` or
    /// `on_false` edge labels from `node`, and records exactly one routing
    /// group. Returns the routes the token should continue onto.
    pub fn execute(
        &self,
        gate: &GateConfig,
        node: &NodeSpec,
        token_id: TokenId,
        step_index: i64,
        attempt: i32,
        row: &RowData,
    ) -> Result<Vec<EdgeSpec>, EngineError> {
        let input_value = row.as_value();
        let state =
            self.recorder.begin_node_state(token_id, self.node_id, step_index, &input_value, attempt, None)?;

        let (result, reason) = evaluate(&gate.condition, &input_value)
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        let labels = if result { &gate.on_true } else { &gate.on_false };

        let mut edges = Vec::with_capacity(labels.len());
        for label in labels {
            let edge = node
                .edge_by_label(label)
                .ok_or_else(|| EngineError::Validation(format!("gate has no outgoing edge labeled {label:?}")))?;
            edges.push(edge.clone());
        }

        if edges.is_empty() {
            self.recorder.complete_node_state(
                state.state_id,
                NodeStateStatus::Completed,
                Some(&serde_json::json!({"routed": false})),
                None,
                None,
                None,
            )?;
            return Ok(edges);
        }

        let routes: Vec<Route> = edges.iter().map(|e| Route { edge_id: e.edge_id, mode: e.mode }).collect();
        let reason_json = RoutingReason::Config(reason).to_json();
        self.recorder.record_routing_events(state.state_id, &routes, Some(reason_json))?;
        self.recorder.complete_node_state(
            state.state_id,
            NodeStateStatus::Completed,
            Some(&serde_json::json!({"routed": true, "result": result})),
            None,
            None,
            None,
        )?;
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Determinism, EdgeMode, NodeType};
    use crate::recorder::InMemoryRecorder;
    use elspeth_gate::{Comparison, Condition};
    use serde_json::json;

    fn node_with_edges(node_id: NodeId, edges: Vec<EdgeSpec>) -> NodeSpec {
        NodeSpec {
            node_id,
            plugin_name: "gate".into(),
            node_type: NodeType::Gate,
            determinism: Determinism::Pure,
            sequence_in_pipeline: None,
            outgoing: edges,
            gate: None,
            flush_triggers: Vec::new(),
        }
    }

    #[test]
    fn true_branch_routes_to_on_true_edge_and_records_one_routing_event() {
        let recorder = InMemoryRecorder::new();
        let run_id = recorder.begin_run(json!({}), "v1").unwrap().run_id;
        let gate_node = recorder
            .register_node(run_id, "gate", NodeType::Gate, "1", json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        let row = recorder.create_row(run_id, gate_node.node_id, 0, &json!({"score": 5}), None).unwrap();
        let token = recorder.create_token(row.row_id, None, None, None).unwrap();
        let target = NodeId::new();
        let edge = recorder.register_edge(run_id, gate_node.node_id, target, "passed", EdgeMode::Move).unwrap();
        let node = node_with_edges(
            gate_node.node_id,
            vec![EdgeSpec { edge_id: edge.edge_id, label: "passed".into(), mode: EdgeMode::Move, to_node_id: target }],
        );
        let gate = GateConfig {
            condition: Condition::compare("score", Comparison::Gt, json!(3)),
            on_true: vec!["passed".into()],
            on_false: vec![],
        };

        let executor = GateExecutor::new(gate_node.node_id, &recorder);
        let row_data = RowData::try_from(json!({"score": 5})).unwrap();
        let edges = executor.execute(&gate, &node, token.token_id, 0, 0, &row_data).unwrap();

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to_node_id, target);
    }

    #[test]
    fn false_branch_with_no_on_false_labels_routes_nowhere_without_failing() {
        let recorder = InMemoryRecorder::new();
        let run_id = recorder.begin_run(json!({}), "v1").unwrap().run_id;
        let gate_node = recorder
            .register_node(run_id, "gate", NodeType::Gate, "1", json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        let row = recorder.create_row(run_id, gate_node.node_id, 0, &json!({"score": 1}), None).unwrap();
        let token = recorder.create_token(row.row_id, None, None, None).unwrap();
        let node = node_with_edges(gate_node.node_id, vec![]);
        let gate = GateConfig {
            condition: Condition::compare("score", Comparison::Gt, json!(3)),
            on_true: vec!["passed".into()],
            on_false: vec![],
        };

        let executor = GateExecutor::new(gate_node.node_id, &recorder);
        let row_data = RowData::try_from(json!({"score": 1})).unwrap();
        let edges = executor.execute(&gate, &node, token.token_id, 0, 0, &row_data).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn unresolvable_label_is_a_validation_error() {
        let recorder = InMemoryRecorder::new();
        let run_id = recorder.begin_run(json!({}), "v1").unwrap().run_id;
        let gate_node = recorder
            .register_node(run_id, "gate", NodeType::Gate, "1", json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        let row = recorder.create_row(run_id, gate_node.node_id, 0, &json!({"score": 5}), None).unwrap();
        let token = recorder.create_token(row.row_id, None, None, None).unwrap();
        let node = node_with_edges(gate_node.node_id, vec![]);
        let gate = GateConfig {
            condition: Condition::compare("score", Comparison::Gt, json!(3)),
            on_true: vec!["passed".into()],
            on_false: vec![],
        };

        let executor = GateExecutor::new(gate_node.node_id, &recorder);
        let row_data = RowData::try_from(json!({"score": 5})).unwrap();
        let err = executor.execute(&gate, &node, token.token_id, 0, 0, &row_data).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
