//! Collaborator traits: the seams between the engine and external plugin
//! code (§2, §6, §9's "global mutable state → context passing").
//!
//! Concrete CSV/JSON/database/HTTP/LLM plugins are out of scope for this
//! crate; `elspeth-testkit` provides reference implementations used by
//! tests and the CLI demo.

mod context;
mod result;

pub use context::PluginContext;
pub use result::{SinkWriteResult, TransformResult};

use crate::errors::EngineError;
use crate::model::{Determinism, RowData};
use serde_json::Value;

/// Produces an ordered, possibly-lazy sequence of rows (§6).
pub trait Source: Send {
    fn next_row(&mut self) -> Option<RowData>;
    fn output_schema(&self) -> Option<&Value> {
        None
    }
    fn determinism(&self) -> Determinism {
        Determinism::NonDeterministic
    }
    fn on_start(&mut self) {}
    fn on_complete(&mut self) {}
}

/// A per-row transform (§4.5). Batch-aware transforms override
/// `process_batch`; the default routes a single-row call through it isn't
/// needed since the transform executor only calls `process_batch` when
/// `is_batch_aware()` is true.
pub trait Transform: Send {
    fn process(&mut self, row: RowData, ctx: &mut PluginContext<'_>) -> TransformResult;

    fn is_batch_aware(&self) -> bool {
        false
    }

    fn process_batch(&mut self, _rows: Vec<RowData>, _ctx: &mut PluginContext<'_>) -> TransformResult {
        TransformResult::error("process_batch not implemented", false)
    }
}

/// Consumes a buffered batch of rows and produces zero or more output rows
/// (§4.7).
pub trait Aggregation: Send {
    fn flush(&mut self, rows: Vec<RowData>, ctx: &mut PluginContext<'_>) -> TransformResult;

    /// Installs opaque state recovered from a checkpoint (§4.7 `restore_state`).
    fn restore_state(&mut self, _state: Value) {}

    /// Returns opaque state to persist in the next checkpoint.
    fn get_restored_state(&self) -> Option<Value> {
        None
    }
}

/// Writes a batch of rows to a destination (§4.8).
pub trait Sink: Send {
    fn write(&mut self, rows: Vec<RowData>, ctx: &mut PluginContext<'_>) -> SinkWriteResult;

    fn supports_resume(&self) -> bool {
        false
    }

    /// Switches the sink to append semantics. Called by the orchestrator
    /// during resume; a sink that returns `supports_resume() == false` must
    /// never have this called (the orchestrator rejects resume up-front).
    fn configure_for_resume(&mut self) -> Result<(), EngineError> {
        Err(EngineError::Validation("sink does not support resume".into()))
    }
}
