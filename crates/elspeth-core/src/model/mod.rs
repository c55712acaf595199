//! The audit data model: entities, identifiers, and validated enum fields.

mod entities;
mod enums;
mod ids;
mod value;

pub use entities::{
    Artifact, Batch, BatchMember, BatchOutput, Call, Checkpoint, Edge, Node, NodeState, Row,
    RoutingEvent, Run, Token, TokenParent,
};
pub use enums::{
    BatchOutputType, BatchStatus, CallStatus, Determinism, EdgeMode, InvalidEnumValue, NodeStateStatus,
    NodeType, ReproducibilityGrade, RunStatus, TriggerReason,
};
pub use ids::{
    ArtifactId, BatchId, CallId, EdgeId, ForkGroupId, JoinGroupId, NodeId, RoutingEventId,
    RoutingGroupId, RowId, StateId, TokenId,
};
pub use value::RowData;

pub use ids::RunId;
