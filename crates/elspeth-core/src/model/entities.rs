//! The 13-table audit entity set plus checkpoints, as plain Rust structs.
//!
//! These mirror the relational schema columns. `elspeth-store-postgres`
//! re-derives a parallel set of Diesel `Queryable`/`Insertable` structs from
//! the same field names for the durable backend; `InMemoryRecorder` uses
//! these directly.

use crate::model::enums::{
    BatchOutputType, BatchStatus, CallStatus, Determinism, EdgeMode, NodeStateStatus, NodeType,
    ReproducibilityGrade, RunStatus,
};
use crate::model::ids::{
    ArtifactId, BatchId, CallId, EdgeId, ForkGroupId, JoinGroupId, NodeId, RoutingEventId,
    RoutingGroupId, RowId, StateId, TokenId,
};
use crate::model::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub config_hash: String,
    pub config_json: Value,
    pub canonical_version: String,
    pub status: RunStatus,
    pub reproducibility_grade: ReproducibilityGrade,
    pub export_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    pub run_id: RunId,
    pub plugin_name: String,
    pub node_type: NodeType,
    pub plugin_version: String,
    pub config_hash: String,
    pub config_json: Value,
    pub schema_hash: Option<String>,
    pub sequence_in_pipeline: Option<i64>,
    pub determinism: Determinism,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: EdgeId,
    pub run_id: RunId,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub label: String,
    pub default_mode: EdgeMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub row_id: RowId,
    pub run_id: RunId,
    pub source_node_id: NodeId,
    pub row_index: i64,
    pub source_data_hash: String,
    pub source_data_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub token_id: TokenId,
    pub row_id: RowId,
    pub fork_group_id: Option<ForkGroupId>,
    pub join_group_id: Option<JoinGroupId>,
    pub branch_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenParent {
    pub token_id: TokenId,
    pub parent_token_id: TokenId,
    pub ordinal: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub state_id: StateId,
    pub token_id: TokenId,
    pub node_id: NodeId,
    pub step_index: i64,
    pub attempt: i32,
    pub status: NodeStateStatus,
    pub input_hash: String,
    pub output_hash: Option<String>,
    pub context_before_json: Option<Value>,
    pub context_after_json: Option<Value>,
    pub duration_ms: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_json: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingEvent {
    pub event_id: RoutingEventId,
    pub state_id: StateId,
    pub edge_id: EdgeId,
    pub routing_group_id: RoutingGroupId,
    pub ordinal: i32,
    pub mode: EdgeMode,
    pub reason_hash: String,
    pub reason_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: BatchId,
    pub run_id: RunId,
    pub aggregation_node_id: NodeId,
    pub attempt: i32,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub aggregation_state_id: Option<StateId>,
    pub trigger_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMember {
    pub batch_id: BatchId,
    pub token_id: TokenId,
    pub ordinal: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub batch_id: BatchId,
    pub output_type: BatchOutputType,
    pub output_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub call_id: CallId,
    pub state_id: StateId,
    pub call_index: i32,
    pub call_type: String,
    pub status: CallStatus,
    pub request_hash: Option<String>,
    pub request_ref: Option<String>,
    pub response_hash: Option<String>,
    pub response_ref: Option<String>,
    pub latency_ms: Option<i64>,
    pub error_json: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: ArtifactId,
    pub run_id: RunId,
    pub produced_by_state_id: StateId,
    pub sink_node_id: NodeId,
    pub artifact_type: String,
    pub path_or_uri: String,
    pub content_hash: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: RunId,
    pub sequence_number: i64,
    pub token_id: TokenId,
    pub node_id: NodeId,
    pub aggregation_state_json: Value,
    pub created_at: DateTime<Utc>,
}
