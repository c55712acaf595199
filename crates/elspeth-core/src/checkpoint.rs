//! Checkpoint/recovery (§4.12): the resume boundary is always derived via
//! `token -> row -> row_index` lineage, never `sequence_number` alone —
//! `sequence_number` only orders checkpoints relative to each other, it says
//! nothing about which source rows are still unprocessed.

use crate::errors::EngineError;
use crate::model::{Checkpoint, NodeId, Row, RunId, TokenId};
use crate::recorder::Recorder;
use serde_json::Value;
use thiserror::Error;

/// Governs the orchestrator's automatic checkpoint cadence (§4.12):
/// checkpoints are created on a configurable cadence of terminal-token
/// events rather than after every single row, since a checkpoint's job is
/// to bound replay-on-crash, not to make every row individually resumable.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointConfig {
    pub enabled: bool,
    pub checkpoint_interval: i64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { enabled: true, checkpoint_interval: 100 }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CheckpointConfigError {
    #[error("checkpoint_interval must be at least 1")]
    IntervalZero,
}

impl CheckpointConfig {
    pub fn validate(&self) -> Result<(), CheckpointConfigError> {
        if self.checkpoint_interval < 1 {
            return Err(CheckpointConfigError::IntervalZero);
        }
        Ok(())
    }
}

pub struct CheckpointManager<'a> {
    recorder: &'a dyn Recorder,
}

impl<'a> CheckpointManager<'a> {
    pub fn new(recorder: &'a dyn Recorder) -> Self {
        Self { recorder }
    }

    pub fn checkpoint(
        &self,
        run_id: RunId,
        sequence_number: i64,
        token_id: TokenId,
        node_id: NodeId,
        aggregation_state: Value,
    ) -> Result<Checkpoint, EngineError> {
        self.recorder.create_checkpoint(run_id, sequence_number, token_id, node_id, aggregation_state)
    }

    pub fn latest(&self, run_id: RunId) -> Result<Option<Checkpoint>, EngineError> {
        self.recorder.get_latest_checkpoint(run_id)
    }

    /// The row_index boundary below which every row is known to be fully
    /// processed, or `None` if no checkpoint exists yet (a fresh run).
    pub fn resume_point(&self, run_id: RunId) -> Result<Option<i64>, EngineError> {
        let checkpoint = match self.latest(run_id)? {
            Some(c) => c,
            None => return Ok(None),
        };
        let token = self.recorder.get_token(checkpoint.token_id)?;
        let row = self.recorder.get_row(token.row_id)?;
        Ok(Some(row.row_index))
    }

    /// Every row at or past the resume boundary — what a resumed run still
    /// needs to process.
    pub fn unprocessed_rows(&self, run_id: RunId) -> Result<Vec<Row>, EngineError> {
        let boundary = self.resume_point(run_id)?;
        let rows = self.recorder.get_rows(run_id)?;
        Ok(match boundary {
            Some(idx) => rows.into_iter().filter(|r| r.row_index > idx).collect(),
            None => rows,
        })
    }

    /// A run is recoverable from a crash when it was left `running` with
    /// batches left `executing`: they must be retried via
    /// [`Recorder::retry_batch`] before resuming the row walk (§7).
    pub fn incomplete_batches(&self, run_id: RunId) -> Result<Vec<crate::model::Batch>, EngineError> {
        self.recorder.get_incomplete_batches(run_id)
    }
}
