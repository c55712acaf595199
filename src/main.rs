//! Runs the bundled demo pipeline once and exits — a smoke test for the
//! orchestrator wiring, runnable as `cargo run` against the in-memory
//! recorder, or `cargo run --features pg_demo` against a real Postgres
//! instance reachable via `DATABASE_URL`.

use elspeth::run_demo;
use elspeth_core::recorder::InMemoryRecorder;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    if let Err(err) = run().await {
        log::error!("demo run failed: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(feature = "pg_demo"))]
async fn run() -> Result<(), elspeth_core::EngineError> {
    let recorder = InMemoryRecorder::new();
    run_demo(&recorder).await
}

#[cfg(feature = "pg_demo")]
async fn run() -> Result<(), elspeth_core::EngineError> {
    use elspeth_store_postgres::{PgRecorder, PoolProvider};

    let pool = elspeth_store_postgres::build_dev_pool_from_env()
        .map_err(|e| elspeth_core::EngineError::Recorder(e.to_string()))?;
    let recorder = PgRecorder::new(PoolProvider { pool });
    run_demo(&recorder).await
}
