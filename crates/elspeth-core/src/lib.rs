//! elspeth-core: the row-oriented pipeline runtime's engine.
//!
//! - Provides the relational audit backbone (the `Recorder` trait and its
//!   thirteen-table-plus-checkpoints data model) and the neutral
//!   orchestration needed to run a row through a configured chain of
//!   transform/gate/aggregation/sink nodes with full provenance.
//! - Every decision a run makes — a route taken, a batch flushed, a call
//!   made to an external system — is recorded before the run continues, so
//!   the audit trail is never a reconstruction after the fact.
//!
//! Modules:
//! - `model`: the audit entities, validated enums, and opaque identifiers.
//! - `canon`: canonical JSON and SHA-256 content hashing.
//! - `recorder`: the sole writer to audit tables, plus an in-memory
//!   reference implementation.
//! - `payload`: content-addressed storage for payloads too large to inline.
//! - `collab`: the Source/Transform/Aggregation/Sink trait boundary plugin
//!   code is written against.
//! - `executor`: one module per node kind, each wrapping a collaborator call
//!   with NodeState bracketing, timing, and routing/call emission.
//! - `pipeline`: the runtime node/edge graph a processor walks.
//! - `processor`: drives one token forward through the graph.
//! - `orchestrator`: owns a run end to end.
//! - `pool`: the bounded, AIMD-throttled concurrent executor shared by
//!   row-level parallelism wherever it is needed.
//! - `checkpoint`: resume-boundary derivation from checkpointed lineage.
//! - `retry`: bounded exponential backoff for retryable plugin failures.
//! - `fingerprint`: HMAC-based secret redaction for stored config.
//! - `errors`: the engine's error taxonomy.

pub mod canon;
pub mod checkpoint;
pub mod collab;
pub mod constants;
pub mod errors;
pub mod executor;
pub mod fingerprint;
pub mod model;
pub mod orchestrator;
pub mod payload;
pub mod pipeline;
pub mod pool;
pub mod processor;
pub mod recorder;
pub mod retry;

pub use constants::CANONICAL_VERSION;
pub use errors::{EngineError, ErrorReason};
pub use orchestrator::{NodeBlueprint, Orchestrator};
pub use recorder::{InMemoryRecorder, Recorder, Route};
