//! The runtime pipeline graph: the configured nodes and edges a run walks,
//! as distinct from the audit-table [`crate::model::Node`] / [`crate::model::Edge`]
//! records the recorder mirrors them into at registration time.

use crate::model::{Determinism, EdgeId, EdgeMode, NodeId, NodeType};
use elspeth_gate::Condition;

#[derive(Debug, Clone)]
pub struct EdgeSpec {
    pub edge_id: EdgeId,
    pub label: String,
    pub mode: EdgeMode,
    pub to_node_id: NodeId,
}

/// A gate's configuration: which outgoing edge labels fire when the
/// condition is true vs. false. More than one label on a side means a fork,
/// which the recorder requires to be all `copy` mode.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub condition: Condition,
    pub on_true: Vec<String>,
    pub on_false: Vec<String>,
}

/// When an aggregation flushes its buffer (§4.7).
#[derive(Debug, Clone)]
pub enum FlushTrigger {
    Count(usize),
    Timeout(std::time::Duration),
    Condition(Condition),
    EndOfSource,
}

#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub node_id: NodeId,
    pub plugin_name: String,
    pub node_type: NodeType,
    pub determinism: Determinism,
    pub sequence_in_pipeline: Option<i64>,
    pub outgoing: Vec<EdgeSpec>,
    pub gate: Option<GateConfig>,
    pub flush_triggers: Vec<FlushTrigger>,
}

impl NodeSpec {
    pub fn edge_by_label(&self, label: &str) -> Option<&EdgeSpec> {
        self.outgoing.iter().find(|e| e.label == label)
    }
}

/// The full configured graph for one run: the node chain plus the edges
/// connecting them, resolved from registration-time config (§4.11).
#[derive(Debug, Clone, Default)]
pub struct PipelineSpec {
    pub nodes: Vec<NodeSpec>,
}

impl PipelineSpec {
    pub fn node(&self, node_id: NodeId) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    /// The single default-forward edge out of a transform/aggregation/sink
    /// node — nodes that aren't gates have exactly one outgoing edge or none
    /// (a terminal sink).
    pub fn default_edge(&self, node_id: NodeId) -> Option<&EdgeSpec> {
        self.node(node_id).and_then(|n| n.outgoing.first())
    }
}
