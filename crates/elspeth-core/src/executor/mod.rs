//! Node executors (§4.5-§4.8): the layer between the processor's token walk
//! and a collaborator's plugin call. Each wraps one call with
//! `begin_node_state`/`complete_node_state`, a timing span, and routing or
//! call emission, so collaborator code never touches the recorder directly.

mod aggregation;
mod gate;
mod sink;
mod transform;

pub use aggregation::{AggregationExecutor, BufferOutcome};
pub use gate::GateExecutor;
pub use sink::SinkExecutor;
pub use transform::TransformExecutor;
