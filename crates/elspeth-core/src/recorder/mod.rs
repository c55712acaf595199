//! The recorder: the sole writer to audit tables (§4.3).
//!
//! Every executor and the orchestrator hold a `&dyn Recorder`; plugin code
//! never touches the audit store directly (§3 Ownership, §5 shared-resource
//! policy).

mod in_memory;

pub use in_memory::InMemoryRecorder;

use crate::errors::EngineError;
use crate::model::{
    Artifact, Batch, BatchId, BatchStatus, Call, CallStatus, Checkpoint, Edge, EdgeId,
    EdgeMode, ForkGroupId, JoinGroupId, Node, NodeId, NodeStateStatus, NodeType, ReproducibilityGrade,
    RoutingEvent, RoutingGroupId, Row, RowId, Run, RunId, RunStatus, StateId, Token, TokenId,
};
use serde_json::Value;

/// One route selected by a gate decision, as passed to
/// [`Recorder::record_routing_events`].
#[derive(Debug, Clone)]
pub struct Route {
    pub edge_id: EdgeId,
    pub mode: EdgeMode,
}

pub trait Recorder: Send + Sync {
    fn begin_run(&self, config: Value, canonical_version: &str) -> Result<Run, EngineError>;
    fn complete_run(
        &self,
        run_id: RunId,
        status: RunStatus,
        reproducibility_grade: Option<ReproducibilityGrade>,
    ) -> Result<(), EngineError>;

    #[allow(clippy::too_many_arguments)]
    fn register_node(
        &self,
        run_id: RunId,
        plugin_name: &str,
        node_type: NodeType,
        plugin_version: &str,
        config: Value,
        determinism: crate::model::Determinism,
        sequence: Option<i64>,
        schema_hash: Option<String>,
    ) -> Result<Node, EngineError>;

    fn register_edge(
        &self,
        run_id: RunId,
        from_node_id: NodeId,
        to_node_id: NodeId,
        label: &str,
        mode: EdgeMode,
    ) -> Result<Edge, EngineError>;

    fn create_row(
        &self,
        run_id: RunId,
        source_node_id: NodeId,
        row_index: i64,
        data: &Value,
        payload_ref: Option<String>,
    ) -> Result<Row, EngineError>;

    fn create_token(
        &self,
        row_id: RowId,
        fork_group_id: Option<ForkGroupId>,
        join_group_id: Option<JoinGroupId>,
        branch_name: Option<String>,
    ) -> Result<Token, EngineError>;

    fn fork_token(
        &self,
        parent_token_id: TokenId,
        row_id: RowId,
        branches: &[String],
    ) -> Result<Vec<Token>, EngineError>;

    fn coalesce_tokens(&self, parent_token_ids: &[TokenId], row_id: RowId) -> Result<Token, EngineError>;

    fn begin_node_state(
        &self,
        token_id: TokenId,
        node_id: NodeId,
        step_index: i64,
        input_data: &Value,
        attempt: i32,
        context_before: Option<Value>,
    ) -> Result<crate::model::NodeState, EngineError>;

    #[allow(clippy::too_many_arguments)]
    fn complete_node_state(
        &self,
        state_id: StateId,
        status: NodeStateStatus,
        output_data: Option<&Value>,
        duration_ms: Option<i64>,
        error: Option<Value>,
        context_after: Option<Value>,
    ) -> Result<(), EngineError>;

    fn record_routing_event(
        &self,
        state_id: StateId,
        edge_id: EdgeId,
        mode: EdgeMode,
        reason: Option<Value>,
        routing_group_id: Option<RoutingGroupId>,
        ordinal: i32,
    ) -> Result<RoutingEvent, EngineError>;

    fn record_routing_events(
        &self,
        state_id: StateId,
        routes: &[Route],
        reason: Option<Value>,
    ) -> Result<Vec<RoutingEvent>, EngineError>;

    fn create_batch(&self, run_id: RunId, aggregation_node_id: NodeId, attempt: i32) -> Result<Batch, EngineError>;
    fn add_batch_member(&self, batch_id: BatchId, token_id: TokenId, ordinal: i32) -> Result<(), EngineError>;
    fn update_batch_status(
        &self,
        batch_id: BatchId,
        status: BatchStatus,
        trigger_reason: Option<String>,
        state_id: Option<StateId>,
    ) -> Result<(), EngineError>;
    fn retry_batch(&self, batch_id: BatchId) -> Result<Batch, EngineError>;

    #[allow(clippy::too_many_arguments)]
    fn record_call(
        &self,
        state_id: StateId,
        call_type: &str,
        status: CallStatus,
        request_data: Option<&Value>,
        response_data: Option<&Value>,
        error: Option<Value>,
        latency_ms: Option<i64>,
    ) -> Result<Call, EngineError>;

    #[allow(clippy::too_many_arguments)]
    fn register_artifact(
        &self,
        run_id: RunId,
        state_id: StateId,
        sink_node_id: NodeId,
        artifact_type: &str,
        path: &str,
        content_hash: &str,
        size_bytes: i64,
    ) -> Result<Artifact, EngineError>;

    fn create_checkpoint(
        &self,
        run_id: RunId,
        sequence_number: i64,
        token_id: TokenId,
        node_id: NodeId,
        aggregation_state: Value,
    ) -> Result<Checkpoint, EngineError>;

    // Read-only query helpers (§4.3), plus the lookups checkpoint/recovery needs.
    fn get_incomplete_batches(&self, run_id: RunId) -> Result<Vec<Batch>, EngineError>;
    fn get_nodes(&self, run_id: RunId) -> Result<Vec<Node>, EngineError>;
    fn get_edges(&self, run_id: RunId) -> Result<Vec<Edge>, EngineError>;
    fn get_tokens(&self, row_id: RowId) -> Result<Vec<Token>, EngineError>;
    fn get_token(&self, token_id: TokenId) -> Result<Token, EngineError>;
    fn get_node_states(&self, token_id: TokenId) -> Result<Vec<crate::model::NodeState>, EngineError>;
    fn get_routing_events(&self, state_id: StateId) -> Result<Vec<RoutingEvent>, EngineError>;
    fn get_calls(&self, state_id: StateId) -> Result<Vec<Call>, EngineError>;
    fn get_batch_members(&self, batch_id: BatchId) -> Result<Vec<crate::model::BatchMember>, EngineError>;
    fn get_rows(&self, run_id: RunId) -> Result<Vec<Row>, EngineError>;
    fn get_row(&self, row_id: RowId) -> Result<Row, EngineError>;
    fn get_latest_checkpoint(&self, run_id: RunId) -> Result<Option<Checkpoint>, EngineError>;
}
