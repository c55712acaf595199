//! A small, deterministic pipeline wired from the in-memory collaborators in
//! `elspeth-testkit`: a row source, an uppercasing transform, a score gate
//! that forks high/low scoring rows, a sum aggregation on the high branch,
//! and two capturing sinks. Exercises every node kind the orchestrator
//! drives (§4.11) against the in-memory recorder by default, or the
//! Postgres-backed one when built with `--features pg_demo` and a reachable
//! `DATABASE_URL`.

use elspeth_core::checkpoint::CheckpointConfig;
use elspeth_core::model::{Determinism, EdgeMode, NodeId, NodeType, RunId};
use elspeth_core::orchestrator::{NodeBlueprint, Orchestrator};
use elspeth_core::payload::InlinePayloadStore;
use elspeth_core::pipeline::{FlushTrigger, GateConfig, PipelineSpec};
use elspeth_core::pool::PoolConfig;
use elspeth_core::processor::NodeCollaborator;
use elspeth_core::recorder::Recorder;
use elspeth_core::retry::RetryPolicy;
use elspeth_core::EngineError;
use elspeth_gate::{Comparison, Condition};
use elspeth_testkit::{CapturingSink, SumAggregation, UppercaseFieldTransform, VecSource};
use serde_json::json;
use std::collections::HashMap;

/// Registers the demo graph against `run_id` and returns the resolved
/// pipeline plus a map of collaborators keyed by their `NodeId`.
pub fn build_demo_pipeline(
    orchestrator: &Orchestrator<'_>,
    run_id: RunId,
) -> Result<(PipelineSpec, HashMap<NodeId, NodeCollaborator>, NodeId, NodeId), EngineError> {
    let blueprints = vec![
        NodeBlueprint {
            label: "source".into(),
            plugin_name: "row_source".into(),
            node_type: NodeType::Source,
            plugin_version: "1.0.0".into(),
            determinism: Determinism::Pure,
            gate: None,
            flush_triggers: Vec::new(),
            outgoing: vec![],
        },
        NodeBlueprint {
            label: "upper".into(),
            plugin_name: "uppercase_name".into(),
            node_type: NodeType::Transform,
            plugin_version: "1.0.0".into(),
            determinism: Determinism::Pure,
            gate: None,
            flush_triggers: Vec::new(),
            outgoing: vec![("next".into(), "score_gate".into(), EdgeMode::Move)],
        },
        NodeBlueprint {
            label: "score_gate".into(),
            plugin_name: "score_gate".into(),
            node_type: NodeType::Gate,
            plugin_version: "1.0.0".into(),
            determinism: Determinism::Pure,
            gate: Some(GateConfig {
                condition: Condition::compare("score", Comparison::Gte, json!(50)),
                on_true: vec!["high".into()],
                on_false: vec!["low".into()],
            }),
            flush_triggers: Vec::new(),
            outgoing: vec![
                ("high".into(), "sum_high".into(), EdgeMode::Move),
                ("low".into(), "sink_low".into(), EdgeMode::Move),
            ],
        },
        NodeBlueprint {
            label: "sum_high".into(),
            plugin_name: "sum_high_scores".into(),
            node_type: NodeType::Aggregation,
            plugin_version: "1.0.0".into(),
            determinism: Determinism::Deterministic,
            gate: None,
            flush_triggers: vec![FlushTrigger::Count(2), FlushTrigger::EndOfSource],
            outgoing: vec![("next".into(), "sink_high".into(), EdgeMode::Move)],
        },
        NodeBlueprint {
            label: "sink_high".into(),
            plugin_name: "high_score_sink".into(),
            node_type: NodeType::Sink,
            plugin_version: "1.0.0".into(),
            determinism: Determinism::IoRead,
            gate: None,
            flush_triggers: Vec::new(),
            outgoing: vec![],
        },
        NodeBlueprint {
            label: "sink_low".into(),
            plugin_name: "low_score_sink".into(),
            node_type: NodeType::Sink,
            plugin_version: "1.0.0".into(),
            determinism: Determinism::IoRead,
            gate: None,
            flush_triggers: Vec::new(),
            outgoing: vec![],
        },
    ];

    let pipeline = orchestrator.register_pipeline(run_id, blueprints)?;
    let source_node_id = pipeline.node_id_by_plugin("row_source");
    let upper_node_id = pipeline.node_id_by_plugin("uppercase_name");
    let sum_node_id = pipeline.node_id_by_plugin("sum_high_scores");
    let sink_high_id = pipeline.node_id_by_plugin("high_score_sink");
    let sink_low_id = pipeline.node_id_by_plugin("low_score_sink");

    let mut collaborators: HashMap<NodeId, NodeCollaborator> = HashMap::new();
    collaborators.insert(upper_node_id, NodeCollaborator::Transform(Box::new(UppercaseFieldTransform::new("name"))));
    collaborators.insert(sum_node_id, NodeCollaborator::Aggregation(Box::new(SumAggregation::new("score"))));
    collaborators.insert(sink_high_id, NodeCollaborator::Sink(Box::new(CapturingSink::new())));
    collaborators.insert(sink_low_id, NodeCollaborator::Sink(Box::new(CapturingSink::new())));

    Ok((pipeline, collaborators, source_node_id, upper_node_id))
}

trait NodeIdByPlugin {
    fn node_id_by_plugin(&self, plugin_name: &str) -> NodeId;
}

impl NodeIdByPlugin for PipelineSpec {
    fn node_id_by_plugin(&self, plugin_name: &str) -> NodeId {
        self.nodes
            .iter()
            .find(|n| n.plugin_name == plugin_name)
            .unwrap_or_else(|| panic!("node {plugin_name:?} not registered"))
            .node_id
    }
}

fn demo_source() -> VecSource {
    VecSource::new(vec![
        json!({"name": "ada", "score": 72}),
        json!({"name": "grace", "score": 41}),
        json!({"name": "alan", "score": 91}),
    ])
}

/// Runs the demo pipeline against `recorder` and logs a short summary of
/// what the audit trail recorded. Takes the recorder as a trait object so
/// the same pipeline definition runs unchanged against the in-memory
/// recorder or the Postgres-backed one.
pub async fn run_demo(recorder: &dyn Recorder) -> Result<(), EngineError> {
    let store = InlinePayloadStore::new();
    let orchestrator =
        Orchestrator::new(recorder, &store, RetryPolicy::default(), PoolConfig::default(), CheckpointConfig::default());

    let run = recorder.begin_run(json!({"demo": "score_routing"}), elspeth_core::CANONICAL_VERSION)?;
    let (pipeline, mut collaborators, source_node_id, entry_node_id) = build_demo_pipeline(&orchestrator, run.run_id)?;

    let mut source = demo_source();
    orchestrator
        .run(json!({"demo": "score_routing"}), &pipeline, source_node_id, entry_node_id, &mut source, &mut collaborators)
        .await?;

    let nodes = recorder.get_nodes(run.run_id)?;
    let rows = recorder.get_rows(run.run_id)?;
    log::info!("run {} completed: {} nodes registered, {} rows ingested", run.run_id, nodes.len(), rows.len());
    for node in &nodes {
        log::info!("  node {:?} ({:?})", node.plugin_name, node.node_type);
    }
    Ok(())
}
