//! Reference in-memory [`Recorder`] implementation.
//!
//! Generalizes the append-and-clone pattern of this workspace's lineage
//! in-memory event store (one `Mutex`-guarded `Vec` per append-only table)
//! from a single event log to the full thirteen-table audit schema plus
//! checkpoints. Used by tests, the CLI demo, and anywhere durability is not
//! required.

use super::{Recorder, Route};
use crate::canon::stable_hash;
use crate::errors::EngineError;
use crate::model::*;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    runs: HashMap<RunId, Run>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    rows: Vec<Row>,
    tokens: Vec<Token>,
    token_parents: Vec<TokenParent>,
    node_states: Vec<NodeState>,
    routing_events: Vec<RoutingEvent>,
    batches: Vec<Batch>,
    batch_members: Vec<BatchMember>,
    calls: Vec<Call>,
    artifacts: Vec<Artifact>,
    checkpoints: Vec<Checkpoint>,
}

pub struct InMemoryRecorder {
    tables: Mutex<Tables>,
}

impl Default for InMemoryRecorder {
    fn default() -> Self {
        Self { tables: Mutex::new(Tables::default()) }
    }
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

fn hash_of(v: &Value) -> Result<String, EngineError> {
    Ok(stable_hash(v)?)
}

impl Recorder for InMemoryRecorder {
    fn begin_run(&self, config: Value, canonical_version: &str) -> Result<Run, EngineError> {
        let run = Run {
            run_id: RunId::new(),
            started_at: Utc::now(),
            completed_at: None,
            config_hash: hash_of(&config)?,
            config_json: config,
            canonical_version: canonical_version.to_string(),
            status: RunStatus::Running,
            reproducibility_grade: ReproducibilityGrade::FullReproducible,
            export_status: None,
        };
        self.tables.lock().unwrap().runs.insert(run.run_id, run.clone());
        Ok(run)
    }

    fn complete_run(
        &self,
        run_id: RunId,
        status: RunStatus,
        reproducibility_grade: Option<ReproducibilityGrade>,
    ) -> Result<(), EngineError> {
        if !matches!(status, RunStatus::Completed | RunStatus::Failed | RunStatus::Crashed) {
            return Err(EngineError::Validation(format!(
                "complete_run requires a terminal status, got {status}"
            )));
        }
        let mut tables = self.tables.lock().unwrap();
        let run = tables
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| EngineError::Validation(format!("unknown run {run_id}")))?;
        run.status = status;
        run.completed_at = Some(Utc::now());
        if let Some(grade) = reproducibility_grade {
            run.reproducibility_grade = grade;
        }
        Ok(())
    }

    fn register_node(
        &self,
        run_id: RunId,
        plugin_name: &str,
        node_type: NodeType,
        plugin_version: &str,
        config: Value,
        determinism: Determinism,
        sequence: Option<i64>,
        schema_hash: Option<String>,
    ) -> Result<Node, EngineError> {
        let node = Node {
            node_id: NodeId::new(),
            run_id,
            plugin_name: plugin_name.to_string(),
            node_type,
            plugin_version: plugin_version.to_string(),
            config_hash: hash_of(&config)?,
            config_json: config,
            schema_hash,
            sequence_in_pipeline: sequence,
            determinism,
        };
        self.tables.lock().unwrap().nodes.push(node.clone());
        Ok(node)
    }

    fn register_edge(
        &self,
        run_id: RunId,
        from_node_id: NodeId,
        to_node_id: NodeId,
        label: &str,
        mode: EdgeMode,
    ) -> Result<Edge, EngineError> {
        let edge = Edge {
            edge_id: EdgeId::new(),
            run_id,
            from_node_id,
            to_node_id,
            label: label.to_string(),
            default_mode: mode,
        };
        self.tables.lock().unwrap().edges.push(edge.clone());
        Ok(edge)
    }

    fn create_row(
        &self,
        run_id: RunId,
        source_node_id: NodeId,
        row_index: i64,
        data: &Value,
        payload_ref: Option<String>,
    ) -> Result<Row, EngineError> {
        let row = Row {
            row_id: RowId::new(),
            run_id,
            source_node_id,
            row_index,
            source_data_hash: hash_of(data)?,
            source_data_ref: payload_ref,
        };
        self.tables.lock().unwrap().rows.push(row.clone());
        Ok(row)
    }

    fn create_token(
        &self,
        row_id: RowId,
        fork_group_id: Option<ForkGroupId>,
        join_group_id: Option<JoinGroupId>,
        branch_name: Option<String>,
    ) -> Result<Token, EngineError> {
        let token = Token { token_id: TokenId::new(), row_id, fork_group_id, join_group_id, branch_name };
        self.tables.lock().unwrap().tokens.push(token.clone());
        Ok(token)
    }

    fn fork_token(
        &self,
        parent_token_id: TokenId,
        row_id: RowId,
        branches: &[String],
    ) -> Result<Vec<Token>, EngineError> {
        let mut unique = branches.to_vec();
        unique.sort();
        unique.dedup();
        if unique.len() != branches.len() {
            return Err(EngineError::Validation("fork_token: duplicate branch names".into()));
        }
        let fork_group_id = ForkGroupId::new();
        let mut tables = self.tables.lock().unwrap();
        let mut children = Vec::with_capacity(branches.len());
        for (ordinal, branch) in branches.iter().enumerate() {
            let token = Token {
                token_id: TokenId::new(),
                row_id,
                fork_group_id: Some(fork_group_id),
                join_group_id: None,
                branch_name: Some(branch.clone()),
            };
            tables.tokens.push(token.clone());
            tables.token_parents.push(TokenParent {
                token_id: token.token_id,
                parent_token_id,
                ordinal: ordinal as i32,
            });
            children.push(token);
        }
        Ok(children)
    }

    fn coalesce_tokens(&self, parent_token_ids: &[TokenId], row_id: RowId) -> Result<Token, EngineError> {
        if parent_token_ids.is_empty() {
            return Err(EngineError::Validation("coalesce_tokens requires at least one parent".into()));
        }
        let join_group_id = JoinGroupId::new();
        let token = Token {
            token_id: TokenId::new(),
            row_id,
            fork_group_id: None,
            join_group_id: Some(join_group_id),
            branch_name: None,
        };
        let mut tables = self.tables.lock().unwrap();
        tables.tokens.push(token.clone());
        for (ordinal, parent) in parent_token_ids.iter().enumerate() {
            tables.token_parents.push(TokenParent {
                token_id: token.token_id,
                parent_token_id: *parent,
                ordinal: ordinal as i32,
            });
        }
        Ok(token)
    }

    fn begin_node_state(
        &self,
        token_id: TokenId,
        node_id: NodeId,
        step_index: i64,
        input_data: &Value,
        attempt: i32,
        context_before: Option<Value>,
    ) -> Result<NodeState, EngineError> {
        let mut tables = self.tables.lock().unwrap();
        let already_open = tables
            .node_states
            .iter()
            .any(|s| s.token_id == token_id && matches!(s.status, NodeStateStatus::Open));
        if already_open {
            return Err(EngineError::Validation(format!(
                "token {token_id} already has an open NodeState"
            )));
        }
        let duplicate = tables.node_states.iter().any(|s| {
            s.token_id == token_id && s.node_id == node_id && s.step_index == step_index && s.attempt == attempt
        });
        if duplicate {
            return Err(EngineError::Validation(
                "NodeState unique constraint violated on (token_id, node_id, step_index, attempt)".into(),
            ));
        }
        let state = NodeState {
            state_id: StateId::new(),
            token_id,
            node_id,
            step_index,
            attempt,
            status: NodeStateStatus::Open,
            input_hash: hash_of(input_data)?,
            output_hash: None,
            context_before_json: context_before,
            context_after_json: None,
            duration_ms: None,
            started_at: Utc::now(),
            completed_at: None,
            error_json: None,
        };
        tables.node_states.push(state.clone());
        Ok(state)
    }

    fn complete_node_state(
        &self,
        state_id: StateId,
        status: NodeStateStatus,
        output_data: Option<&Value>,
        duration_ms: Option<i64>,
        error: Option<Value>,
        context_after: Option<Value>,
    ) -> Result<(), EngineError> {
        if matches!(status, NodeStateStatus::Open) {
            return Err(EngineError::Validation("complete_node_state requires a terminal status".into()));
        }
        let output_hash = output_data.map(hash_of).transpose()?;
        let mut tables = self.tables.lock().unwrap();
        let state = tables
            .node_states
            .iter_mut()
            .find(|s| s.state_id == state_id)
            .ok_or_else(|| EngineError::Validation(format!("unknown state {state_id}")))?;
        if !matches!(state.status, NodeStateStatus::Open) {
            return Err(EngineError::Validation(format!("state {state_id} is not open")));
        }
        state.status = status;
        state.output_hash = output_hash;
        state.duration_ms = duration_ms;
        state.error_json = error;
        state.context_after_json = context_after;
        state.completed_at = Some(Utc::now());
        Ok(())
    }

    fn record_routing_event(
        &self,
        state_id: StateId,
        edge_id: EdgeId,
        mode: EdgeMode,
        reason: Option<Value>,
        routing_group_id: Option<RoutingGroupId>,
        ordinal: i32,
    ) -> Result<RoutingEvent, EngineError> {
        let reason_hash = hash_of(&reason.clone().unwrap_or(Value::Null))?;
        let event = RoutingEvent {
            event_id: RoutingEventId::new(),
            state_id,
            edge_id,
            routing_group_id: routing_group_id.unwrap_or_else(RoutingGroupId::new),
            ordinal,
            mode,
            reason_hash,
            reason_ref: None,
        };
        self.tables.lock().unwrap().routing_events.push(event.clone());
        Ok(event)
    }

    fn record_routing_events(
        &self,
        state_id: StateId,
        routes: &[Route],
        reason: Option<Value>,
    ) -> Result<Vec<RoutingEvent>, EngineError> {
        if routes.is_empty() {
            return Err(EngineError::Validation("record_routing_events requires at least one route".into()));
        }
        if routes.len() > 1 {
            let mut edges: Vec<EdgeId> = routes.iter().map(|r| r.edge_id).collect();
            edges.sort_by_key(|e| e.0);
            edges.dedup();
            if edges.len() != routes.len() {
                return Err(EngineError::Validation("routing group has a duplicate edge".into()));
            }
            if !routes.iter().all(|r| matches!(r.mode, EdgeMode::Copy)) {
                return Err(EngineError::Validation("a fork routing group must use mode=copy for every route".into()));
            }
        }
        let routing_group_id = RoutingGroupId::new();
        let reason_hash = hash_of(&reason.clone().unwrap_or(Value::Null))?;
        let mut tables = self.tables.lock().unwrap();
        let mut events = Vec::with_capacity(routes.len());
        for (ordinal, route) in routes.iter().enumerate() {
            let event = RoutingEvent {
                event_id: RoutingEventId::new(),
                state_id,
                edge_id: route.edge_id,
                routing_group_id,
                ordinal: ordinal as i32,
                mode: route.mode,
                reason_hash: reason_hash.clone(),
                reason_ref: None,
            };
            tables.routing_events.push(event.clone());
            events.push(event);
        }
        Ok(events)
    }

    fn create_batch(&self, run_id: RunId, aggregation_node_id: NodeId, attempt: i32) -> Result<Batch, EngineError> {
        let batch = Batch {
            batch_id: BatchId::new(),
            run_id,
            aggregation_node_id,
            attempt,
            status: BatchStatus::Draft,
            created_at: Utc::now(),
            completed_at: None,
            aggregation_state_id: None,
            trigger_reason: None,
        };
        self.tables.lock().unwrap().batches.push(batch.clone());
        Ok(batch)
    }

    fn add_batch_member(&self, batch_id: BatchId, token_id: TokenId, ordinal: i32) -> Result<(), EngineError> {
        let mut tables = self.tables.lock().unwrap();
        let conflict = tables
            .batch_members
            .iter()
            .any(|m| m.batch_id == batch_id && (m.ordinal == ordinal || m.token_id == token_id));
        if conflict {
            return Err(EngineError::Validation(
                "BatchMember unique constraint violated on (batch_id, ordinal) or (batch_id, token_id)".into(),
            ));
        }
        tables.batch_members.push(BatchMember { batch_id, token_id, ordinal });
        Ok(())
    }

    fn update_batch_status(
        &self,
        batch_id: BatchId,
        status: BatchStatus,
        trigger_reason: Option<String>,
        state_id: Option<StateId>,
    ) -> Result<(), EngineError> {
        let mut tables = self.tables.lock().unwrap();
        let batch = tables
            .batches
            .iter_mut()
            .find(|b| b.batch_id == batch_id)
            .ok_or_else(|| EngineError::Validation(format!("unknown batch {batch_id}")))?;
        let legal = matches!(
            (batch.status, status),
            (BatchStatus::Draft, BatchStatus::Executing)
                | (BatchStatus::Executing, BatchStatus::Completed)
                | (BatchStatus::Executing, BatchStatus::Failed)
        );
        if !legal {
            return Err(EngineError::Validation(format!(
                "illegal batch transition {} -> {}",
                batch.status, status
            )));
        }
        batch.status = status;
        if let Some(reason) = trigger_reason {
            batch.trigger_reason = Some(reason);
        }
        if let Some(sid) = state_id {
            batch.aggregation_state_id = Some(sid);
        }
        if matches!(status, BatchStatus::Completed | BatchStatus::Failed) {
            batch.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    fn retry_batch(&self, batch_id: BatchId) -> Result<Batch, EngineError> {
        let mut tables = self.tables.lock().unwrap();
        let original = tables
            .batches
            .iter()
            .find(|b| b.batch_id == batch_id)
            .cloned()
            .ok_or_else(|| EngineError::Validation(format!("unknown batch {batch_id}")))?;
        if !matches!(original.status, BatchStatus::Failed) {
            return Err(EngineError::Validation("retry_batch requires the original batch to be failed".into()));
        }
        let new_batch = Batch {
            batch_id: BatchId::new(),
            run_id: original.run_id,
            aggregation_node_id: original.aggregation_node_id,
            attempt: original.attempt + 1,
            status: BatchStatus::Draft,
            created_at: Utc::now(),
            completed_at: None,
            aggregation_state_id: None,
            trigger_reason: None,
        };
        tables.batches.push(new_batch.clone());
        let members: Vec<BatchMember> = tables
            .batch_members
            .iter()
            .filter(|m| m.batch_id == batch_id)
            .map(|m| BatchMember { batch_id: new_batch.batch_id, token_id: m.token_id, ordinal: m.ordinal })
            .collect();
        tables.batch_members.extend(members);
        Ok(new_batch)
    }

    fn record_call(
        &self,
        state_id: StateId,
        call_type: &str,
        status: CallStatus,
        request_data: Option<&Value>,
        response_data: Option<&Value>,
        error: Option<Value>,
        latency_ms: Option<i64>,
    ) -> Result<Call, EngineError> {
        let request_hash = request_data.map(hash_of).transpose()?;
        let response_hash = response_data.map(hash_of).transpose()?;
        let mut tables = self.tables.lock().unwrap();
        let call_index = tables.calls.iter().filter(|c| c.state_id == state_id).count() as i32;
        let call = Call {
            call_id: CallId::new(),
            state_id,
            call_index,
            call_type: call_type.to_string(),
            status,
            request_hash,
            request_ref: None,
            response_hash,
            response_ref: None,
            latency_ms,
            error_json: error,
        };
        tables.calls.push(call.clone());
        Ok(call)
    }

    fn register_artifact(
        &self,
        run_id: RunId,
        state_id: StateId,
        sink_node_id: NodeId,
        artifact_type: &str,
        path: &str,
        content_hash: &str,
        size_bytes: i64,
    ) -> Result<Artifact, EngineError> {
        let artifact = Artifact {
            artifact_id: ArtifactId::new(),
            run_id,
            produced_by_state_id: state_id,
            sink_node_id,
            artifact_type: artifact_type.to_string(),
            path_or_uri: path.to_string(),
            content_hash: content_hash.to_string(),
            size_bytes,
        };
        self.tables.lock().unwrap().artifacts.push(artifact.clone());
        Ok(artifact)
    }

    fn create_checkpoint(
        &self,
        run_id: RunId,
        sequence_number: i64,
        token_id: TokenId,
        node_id: NodeId,
        aggregation_state: Value,
    ) -> Result<Checkpoint, EngineError> {
        let checkpoint = Checkpoint {
            run_id,
            sequence_number,
            token_id,
            node_id,
            aggregation_state_json: aggregation_state,
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().checkpoints.push(checkpoint.clone());
        Ok(checkpoint)
    }

    fn get_incomplete_batches(&self, run_id: RunId) -> Result<Vec<Batch>, EngineError> {
        let tables = self.tables.lock().unwrap();
        let mut out: Vec<Batch> = tables
            .batches
            .iter()
            .filter(|b| {
                b.run_id == run_id
                    && matches!(b.status, BatchStatus::Draft | BatchStatus::Executing | BatchStatus::Failed)
            })
            .cloned()
            .collect();
        out.sort_by_key(|b| b.created_at);
        Ok(out)
    }

    fn get_nodes(&self, run_id: RunId) -> Result<Vec<Node>, EngineError> {
        let tables = self.tables.lock().unwrap();
        let mut out: Vec<Node> = tables.nodes.iter().filter(|n| n.run_id == run_id).cloned().collect();
        out.sort_by_key(|n| (n.sequence_in_pipeline.is_none(), n.sequence_in_pipeline));
        Ok(out)
    }

    fn get_edges(&self, run_id: RunId) -> Result<Vec<Edge>, EngineError> {
        Ok(self.tables.lock().unwrap().edges.iter().filter(|e| e.run_id == run_id).cloned().collect())
    }

    fn get_tokens(&self, row_id: RowId) -> Result<Vec<Token>, EngineError> {
        Ok(self.tables.lock().unwrap().tokens.iter().filter(|t| t.row_id == row_id).cloned().collect())
    }

    fn get_token(&self, token_id: TokenId) -> Result<Token, EngineError> {
        self.tables
            .lock()
            .unwrap()
            .tokens
            .iter()
            .find(|t| t.token_id == token_id)
            .cloned()
            .ok_or_else(|| EngineError::Validation(format!("unknown token {token_id}")))
    }

    fn get_node_states(&self, token_id: TokenId) -> Result<Vec<NodeState>, EngineError> {
        let tables = self.tables.lock().unwrap();
        let mut out: Vec<NodeState> =
            tables.node_states.iter().filter(|s| s.token_id == token_id).cloned().collect();
        out.sort_by_key(|s| (s.step_index, s.attempt));
        Ok(out)
    }

    fn get_routing_events(&self, state_id: StateId) -> Result<Vec<RoutingEvent>, EngineError> {
        let tables = self.tables.lock().unwrap();
        let mut out: Vec<RoutingEvent> =
            tables.routing_events.iter().filter(|e| e.state_id == state_id).cloned().collect();
        out.sort_by_key(|e| e.ordinal);
        Ok(out)
    }

    fn get_calls(&self, state_id: StateId) -> Result<Vec<Call>, EngineError> {
        let tables = self.tables.lock().unwrap();
        let mut out: Vec<Call> = tables.calls.iter().filter(|c| c.state_id == state_id).cloned().collect();
        out.sort_by_key(|c| c.call_index);
        Ok(out)
    }

    fn get_batch_members(&self, batch_id: BatchId) -> Result<Vec<BatchMember>, EngineError> {
        let tables = self.tables.lock().unwrap();
        let mut out: Vec<BatchMember> =
            tables.batch_members.iter().filter(|m| m.batch_id == batch_id).cloned().collect();
        out.sort_by_key(|m| m.ordinal);
        Ok(out)
    }

    fn get_rows(&self, run_id: RunId) -> Result<Vec<Row>, EngineError> {
        let tables = self.tables.lock().unwrap();
        let mut out: Vec<Row> = tables.rows.iter().filter(|r| r.run_id == run_id).cloned().collect();
        out.sort_by_key(|r| r.row_index);
        Ok(out)
    }

    fn get_row(&self, row_id: RowId) -> Result<Row, EngineError> {
        self.tables
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|r| r.row_id == row_id)
            .cloned()
            .ok_or_else(|| EngineError::Validation(format!("unknown row {row_id}")))
    }

    fn get_latest_checkpoint(&self, run_id: RunId) -> Result<Option<Checkpoint>, EngineError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .checkpoints
            .iter()
            .filter(|c| c.run_id == run_id)
            .max_by_key(|c| c.sequence_number)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_run(r: &InMemoryRecorder) -> RunId {
        r.begin_run(json!({}), "v1").unwrap().run_id
    }

    #[test]
    fn begin_and_complete_run() {
        let r = InMemoryRecorder::new();
        let run_id = new_run(&r);
        r.complete_run(run_id, RunStatus::Completed, None).unwrap();
        assert!(r.complete_run(run_id, RunStatus::Running, None).is_err());
    }

    #[test]
    fn node_state_cannot_have_two_open_attempts_for_one_token() {
        let r = InMemoryRecorder::new();
        let run_id = new_run(&r);
        let node = r
            .register_node(run_id, "p", NodeType::Transform, "1", json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        let row = r.create_row(run_id, node.node_id, 0, &json!({}), None).unwrap();
        let token = r.create_token(row.row_id, None, None, None).unwrap();
        r.begin_node_state(token.token_id, node.node_id, 0, &json!({}), 0, None).unwrap();
        let second = r.begin_node_state(token.token_id, node.node_id, 1, &json!({}), 0, None);
        assert!(second.is_err());
    }

    #[test]
    fn fork_token_rejects_duplicate_branch_names() {
        let r = InMemoryRecorder::new();
        let run_id = new_run(&r);
        let node = r
            .register_node(run_id, "p", NodeType::Gate, "1", json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        let row = r.create_row(run_id, node.node_id, 0, &json!({}), None).unwrap();
        let token = r.create_token(row.row_id, None, None, None).unwrap();
        let result = r.fork_token(token.token_id, row.row_id, &["a".to_string(), "a".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn routing_group_fork_requires_copy_mode() {
        let r = InMemoryRecorder::new();
        let run_id = new_run(&r);
        let node = r
            .register_node(run_id, "p", NodeType::Gate, "1", json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        let row = r.create_row(run_id, node.node_id, 0, &json!({}), None).unwrap();
        let token = r.create_token(row.row_id, None, None, None).unwrap();
        let state = r.begin_node_state(token.token_id, node.node_id, 0, &json!({}), 0, None).unwrap();
        let e1 = r.register_edge(run_id, node.node_id, node.node_id, "a", EdgeMode::Move).unwrap();
        let e2 = r.register_edge(run_id, node.node_id, node.node_id, "b", EdgeMode::Move).unwrap();
        let routes = vec![Route { edge_id: e1.edge_id, mode: EdgeMode::Move }, Route { edge_id: e2.edge_id, mode: EdgeMode::Copy }];
        assert!(r.record_routing_events(state.state_id, &routes, None).is_err());
    }

    #[test]
    fn retry_batch_requires_failed_status() {
        let r = InMemoryRecorder::new();
        let run_id = new_run(&r);
        let node = r
            .register_node(run_id, "p", NodeType::Aggregation, "1", json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        let batch = r.create_batch(run_id, node.node_id, 0).unwrap();
        assert!(r.retry_batch(batch.batch_id).is_err());
        r.update_batch_status(batch.batch_id, BatchStatus::Executing, None, None).unwrap();
        r.update_batch_status(batch.batch_id, BatchStatus::Failed, None, None).unwrap();
        let retried = r.retry_batch(batch.batch_id).unwrap();
        assert_eq!(retried.attempt, 1);
    }

    #[test]
    fn checkpoint_latest_by_sequence_number() {
        let r = InMemoryRecorder::new();
        let run_id = new_run(&r);
        let node = r
            .register_node(run_id, "p", NodeType::Source, "1", json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        let row = r.create_row(run_id, node.node_id, 0, &json!({}), None).unwrap();
        let token = r.create_token(row.row_id, None, None, None).unwrap();
        r.create_checkpoint(run_id, 1, token.token_id, node.node_id, json!({})).unwrap();
        r.create_checkpoint(run_id, 3, token.token_id, node.node_id, json!({})).unwrap();
        r.create_checkpoint(run_id, 2, token.token_id, node.node_id, json!({})).unwrap();
        let latest = r.get_latest_checkpoint(run_id).unwrap().unwrap();
        assert_eq!(latest.sequence_number, 3);
    }
}
