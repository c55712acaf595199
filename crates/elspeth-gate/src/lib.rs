//! Config-driven condition evaluation for gates and aggregation triggers.
//!
//! Gates are not pluggable; they are first-class engine operations
//! configured with a boolean condition expression over the row. This crate
//! is kept separate from the row-processing engine the way a deterministic
//! decision policy was kept separate from its caller in this workspace's
//! lineage — same shape (candidates/params in, a decision plus an
//! auditable rationale out), applied here to condition evaluation instead
//! of property selection.

mod condition;
mod reason;

pub use condition::{Comparison, Condition, GateError};
pub use reason::{ConfigGateReason, PluginGateReason, RoutingReason};

use serde_json::Value;

/// Evaluates `condition` against `row`, returning the boolean result plus a
/// [`ConfigGateReason`] suitable for storage as a RoutingEvent's reason.
pub fn evaluate(condition: &Condition, row: &Value) -> Result<(bool, ConfigGateReason), GateError> {
    let result = condition.eval(row)?;
    let reason = ConfigGateReason { condition: condition.to_string(), result };
    Ok((result, reason))
}
