//! Durable, Postgres-backed audit storage.
//!
//! Provides a [`pg::PgRecorder`] that implements `elspeth_core::recorder::Recorder`
//! against the same 13-table audit model `InMemoryRecorder` keeps in process
//! memory, so a pipeline run can be replayed and explained whether it used
//! the in-memory backend or this one.
//!
//! Modules:
//! - `pg`: the Diesel-backed `Recorder` plus pool/connection plumbing.
//! - `migrations`: embedded Diesel migration runner.
//! - `config`: connection settings loaded from `.env`.
//! - `schema`: hand-written Diesel table definitions (kept in sync with
//!   `elspeth_core::model::entities` field-for-field).

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::init_dotenv;
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgPool, PgRecorder, PoolProvider};
