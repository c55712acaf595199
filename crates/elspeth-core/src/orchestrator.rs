//! The orchestrator (§4.11): owns a run end to end — registering the
//! pipeline graph, pulling rows from a source, driving each through the
//! processor, flushing any open aggregations at end-of-source, and closing
//! out the run's terminal status.
//!
//! Row-level concurrency reuses the pooled executor (§5): the orchestrator
//! is itself "a plugin that wants per-row concurrency" in the same sense a
//! transform or sink is.

use crate::checkpoint::{CheckpointConfig, CheckpointManager};
use crate::collab::Source;
use crate::constants::CANONICAL_VERSION;
use crate::errors::EngineError;
use crate::model::{Determinism, EdgeMode, NodeId, NodeType, RunId, RunStatus};
use crate::payload::PayloadStore;
use crate::pipeline::PipelineSpec;
use crate::pool::{ItemOutcome, PoolConfig, PooledExecutor, RowContext};
use crate::processor::{NodeCollaborator, RowProcessor};
use crate::recorder::Recorder;
use crate::retry::RetryPolicy;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Snapshots every open aggregation's opaque continuation state into the
/// JSON map a checkpoint stores under `aggregation_state_json`, keyed by
/// node_id. Nodes whose plugin has nothing to restore are omitted.
fn aggregation_state_snapshot(collaborators: &HashMap<NodeId, NodeCollaborator>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (node_id, collaborator) in collaborators {
        if let NodeCollaborator::Aggregation(aggregation) = collaborator {
            if let Some(state) = aggregation.get_restored_state() {
                map.insert(node_id.to_string(), state);
            }
        }
    }
    serde_json::Value::Object(map)
}

/// One node's static description as supplied at pipeline construction time,
/// before node_ids exist. `label` is this node's own name, used to resolve
/// `outgoing` edge targets by label.
pub struct NodeBlueprint {
    pub label: String,
    pub plugin_name: String,
    pub node_type: NodeType,
    pub plugin_version: String,
    pub determinism: Determinism,
    pub gate: Option<crate::pipeline::GateConfig>,
    pub flush_triggers: Vec<crate::pipeline::FlushTrigger>,
    /// `(edge_label, target_node_label, mode)`.
    pub outgoing: Vec<(String, String, EdgeMode)>,
}

pub struct Orchestrator<'a> {
    recorder: &'a dyn Recorder,
    payload_store: &'a dyn PayloadStore,
    retry_policy: RetryPolicy,
    pool_config: PoolConfig,
    checkpoint_config: CheckpointConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        recorder: &'a dyn Recorder,
        payload_store: &'a dyn PayloadStore,
        retry_policy: RetryPolicy,
        pool_config: PoolConfig,
        checkpoint_config: CheckpointConfig,
    ) -> Self {
        Self { recorder, payload_store, retry_policy, pool_config, checkpoint_config }
    }

    /// Registers every node and edge in `blueprints` against `run_id`,
    /// resolving label-based edge targets into real [`NodeId`]s, and
    /// returns the runtime [`PipelineSpec`] the processor walks.
    pub fn register_pipeline(
        &self,
        run_id: RunId,
        blueprints: Vec<NodeBlueprint>,
    ) -> Result<PipelineSpec, EngineError> {
        let mut node_ids: HashMap<String, NodeId> = HashMap::new();
        let mut nodes = Vec::with_capacity(blueprints.len());

        for (sequence, blueprint) in blueprints.iter().enumerate() {
            let node = self.recorder.register_node(
                run_id,
                &blueprint.plugin_name,
                blueprint.node_type,
                &blueprint.plugin_version,
                serde_json::Value::Null,
                blueprint.determinism,
                Some(sequence as i64),
                None,
            )?;
            node_ids.insert(blueprint.label.clone(), node.node_id);
        }

        for blueprint in &blueprints {
            let from_node_id = node_ids[&blueprint.label];
            let mut outgoing = Vec::with_capacity(blueprint.outgoing.len());
            for (edge_label, target_label, mode) in &blueprint.outgoing {
                let to_node_id = *node_ids
                    .get(target_label)
                    .ok_or_else(|| EngineError::Validation(format!("edge target {target_label:?} not found")))?;
                let edge = self.recorder.register_edge(run_id, from_node_id, to_node_id, edge_label, *mode)?;
                outgoing.push(crate::pipeline::EdgeSpec {
                    edge_id: edge.edge_id,
                    label: edge_label.clone(),
                    mode: *mode,
                    to_node_id,
                });
            }
            nodes.push(crate::pipeline::NodeSpec {
                node_id: node_ids[&blueprint.label],
                plugin_name: blueprint.plugin_name.clone(),
                node_type: blueprint.node_type,
                determinism: blueprint.determinism,
                sequence_in_pipeline: None,
                outgoing,
                gate: blueprint.gate.clone(),
                flush_triggers: blueprint.flush_triggers.clone(),
            });
        }

        Ok(PipelineSpec { nodes })
    }

    /// Runs a pipeline from a fresh [`crate::model::Run`] to completion:
    /// pulls every row from `source`, drives it through `entry_node_id`, and
    /// flushes any aggregation node left with a partial batch at
    /// end-of-source (§4.7's `end_of_source` trigger).
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        config: serde_json::Value,
        pipeline: &'a PipelineSpec,
        source_node_id: NodeId,
        entry_node_id: NodeId,
        source: &mut dyn Source,
        collaborators: &mut HashMap<NodeId, NodeCollaborator>,
    ) -> Result<RunId, EngineError> {
        let run = self.recorder.begin_run(config, CANONICAL_VERSION)?;
        let processor = RowProcessor::new(run.run_id, pipeline, self.recorder, self.payload_store, self.retry_policy);
        let mut aggregation_batches = HashMap::new();
        let checkpoints = self.checkpoints(run.run_id);

        let mut row_index: i64 = 0;
        let mut checkpoint_sequence: i64 = 0;
        let mut run_failed = false;

        source.on_start();
        while let Some(row_data) = source.next_row() {
            let row_value = row_data.as_value();
            let row = self.recorder.create_row(run.run_id, source_node_id, row_index, &row_value, None)?;
            let token = self.recorder.create_token(row.row_id, None, None, None)?;
            let outcome = processor
                .advance(
                    collaborators,
                    &mut aggregation_batches,
                    token.token_id,
                    row.row_id,
                    entry_node_id,
                    row_data,
                    0,
                )
                .await;
            if let Err(err) = outcome {
                log::error!("row {row_index} failed: {err}");
                run_failed = true;
                break;
            }

            if self.checkpoint_config.enabled && (row_index + 1) % self.checkpoint_config.checkpoint_interval == 0 {
                checkpoint_sequence += 1;
                checkpoints.checkpoint(
                    run.run_id,
                    checkpoint_sequence,
                    token.token_id,
                    source_node_id,
                    aggregation_state_snapshot(collaborators),
                )?;
            }

            row_index += 1;
        }
        source.on_complete();

        if !run_failed {
            self.flush_end_of_source(&processor, pipeline, collaborators, &mut aggregation_batches).await?;
        }

        let status = if run_failed { RunStatus::Failed } else { RunStatus::Completed };
        self.recorder.complete_run(run.run_id, status, None)?;
        Ok(run.run_id)
    }

    async fn flush_end_of_source(
        &self,
        processor: &RowProcessor<'a>,
        pipeline: &PipelineSpec,
        collaborators: &mut HashMap<NodeId, NodeCollaborator>,
        aggregation_batches: &mut HashMap<NodeId, crate::executor::AggregationExecutor<'a>>,
    ) -> Result<(), EngineError> {
        for node in &pipeline.nodes {
            if !matches!(node.node_type, NodeType::Aggregation) {
                continue;
            }
            let Some(edge) = node.outgoing.first().cloned() else { continue };

            let (out_rows, row_id) = {
                let Some(batch) = aggregation_batches.get_mut(&node.node_id) else { continue };
                if batch.is_empty() {
                    continue;
                }
                let Some(token_id) = batch.representative_token() else { continue };
                let NodeCollaborator::Aggregation(aggregation) = collaborators.get_mut(&node.node_id).ok_or_else(|| {
                    EngineError::Validation(format!("no collaborator registered for node {}", node.node_id))
                })?
                else {
                    return Err(EngineError::Validation(format!("node {} is not an aggregation", node.node_id)));
                };
                let row_id = self.recorder.get_token(token_id)?.row_id;
                let out_rows = batch.flush_end_of_source(aggregation.as_mut(), token_id, 0, 0)?;
                (out_rows, row_id)
            };

            for row in out_rows {
                let continuation_token = self.recorder.create_token(row_id, None, None, None)?;
                processor
                    .advance(
                        collaborators,
                        aggregation_batches,
                        continuation_token.token_id,
                        row_id,
                        edge.to_node_id,
                        row,
                        0,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Reconstructs a [`CheckpointManager`] view over `run_id`, for
    /// deciding where a resumed run should continue (§4.12, §7's
    /// `CrashRecoveryNeeded` path). Callers retry any batch
    /// [`CheckpointManager::incomplete_batches`] reports before resuming the
    /// row walk itself.
    pub fn checkpoints(&self, _run_id: RunId) -> CheckpointManager<'a> {
        CheckpointManager::new(self.recorder)
    }

    /// Resumes a crashed run (§4.12, §7's `CrashRecoveryNeeded` path):
    ///
    /// 1. Any batch left `executing` when the process died did not finish
    ///    its flush; it is marked `failed`.
    /// 2. Every `failed` batch is retried via [`Recorder::retry_batch`],
    ///    which opens a fresh `draft` batch carrying the same membership —
    ///    a resumed run never silently drops rows a dead batch had already
    ///    accepted.
    /// 3. The resume boundary is derived from the latest checkpoint's
    ///    `token -> row -> row_index` lineage, never from `sequence_number`
    ///    alone.
    /// 4. `source` is walked from the beginning — this reference
    ///    orchestrator has no seekable source — and every row at or before
    ///    the boundary is skipped without re-entering the processor.
    /// 5. Remaining rows feed the processor exactly as [`Self::run`] does,
    ///    and the run is closed out with a terminal status.
    ///
    /// Aggregation executors are not rehydrated from
    /// `aggregation_state_json`: that value is the plugin's own opaque
    /// continuation state, not a serialization of the in-process buffer, so
    /// a resumed aggregation node starts a fresh batch and accumulates from
    /// the boundary forward rather than reconstructing pre-crash buffering.
    pub async fn resume(
        &self,
        run_id: RunId,
        pipeline: &'a PipelineSpec,
        source_node_id: NodeId,
        entry_node_id: NodeId,
        source: &mut dyn Source,
        collaborators: &mut HashMap<NodeId, NodeCollaborator>,
    ) -> Result<(), EngineError> {
        let checkpoints = self.checkpoints(run_id);

        for batch in checkpoints.incomplete_batches(run_id)? {
            if matches!(batch.status, crate::model::BatchStatus::Executing) {
                self.recorder.update_batch_status(
                    batch.batch_id,
                    crate::model::BatchStatus::Failed,
                    Some("crash_recovery".to_string()),
                    None,
                )?;
            }
        }
        for batch in checkpoints.incomplete_batches(run_id)? {
            if matches!(batch.status, crate::model::BatchStatus::Failed) {
                self.recorder.retry_batch(batch.batch_id)?;
            }
        }

        let boundary = checkpoints.resume_point(run_id)?;
        let processor = RowProcessor::new(run_id, pipeline, self.recorder, self.payload_store, self.retry_policy);
        let mut aggregation_batches = HashMap::new();
        let mut run_failed = false;
        let mut row_index: i64 = 0;
        let mut checkpoint_sequence: i64 = 0;

        source.on_start();
        while let Some(row_data) = source.next_row() {
            let skip = boundary.is_some_and(|b| row_index <= b);
            if !skip {
                let row_value = row_data.as_value();
                let row = self.recorder.create_row(run_id, source_node_id, row_index, &row_value, None)?;
                let token = self.recorder.create_token(row.row_id, None, None, None)?;
                let outcome = processor
                    .advance(collaborators, &mut aggregation_batches, token.token_id, row.row_id, entry_node_id, row_data, 0)
                    .await;
                if let Err(err) = outcome {
                    log::error!("row {row_index} failed during resume: {err}");
                    run_failed = true;
                    break;
                }

                if self.checkpoint_config.enabled && (row_index + 1) % self.checkpoint_config.checkpoint_interval == 0 {
                    checkpoint_sequence += 1;
                    checkpoints.checkpoint(
                        run_id,
                        checkpoint_sequence,
                        token.token_id,
                        source_node_id,
                        aggregation_state_snapshot(collaborators),
                    )?;
                }
            }
            row_index += 1;
        }
        source.on_complete();

        if !run_failed {
            self.flush_end_of_source(&processor, pipeline, collaborators, &mut aggregation_batches).await?;
        }

        let status = if run_failed { RunStatus::Failed } else { RunStatus::Completed };
        self.recorder.complete_run(run_id, status, None)?;
        Ok(())
    }

    /// Runs `items` through a per-row closure with bounded concurrency and
    /// AIMD dispatch throttling (§5), for callers that want row-level
    /// parallelism across independent rows rather than the orchestrator's
    /// default sequential walk.
    pub async fn run_pooled<T, R, E, F, Fut>(
        &self,
        items: Vec<RowContext<T>>,
        f: F,
        cancel: CancellationToken,
    ) -> Result<Vec<crate::pool::PoolResult<R, E>>, EngineError>
    where
        T: Send + Clone + 'static,
        R: Send + 'static,
        E: Send + std::fmt::Display + std::fmt::Debug + 'static,
        F: Fn(RowContext<T>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ItemOutcome<R, E>> + Send + 'static,
    {
        let executor = PooledExecutor::new(self.pool_config)
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        Ok(executor.run(items, f, cancel).await)
    }
}
