//! The pooled executor (§4.4): a bounded worker pool with an AIMD dispatch
//! throttle and a reorder buffer, shared by any plugin that wants per-row
//! concurrency.
//!
//! Workers are `tokio` tasks coordinated by a `Semaphore` and a `JoinSet`,
//! the same bounded-concurrency shape used for per-level DAG execution in
//! the worker-pool engine this module is enriched from, adapted here from
//! per-level barriers to a single AIMD-throttled dispatch loop.

mod config;
mod throttle;

pub use config::{PoolConfig, PoolConfigError};

use crate::model::StateId;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use throttle::AimdThrottle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Per-item context handed to the process function, per §4.4's `RowContext`.
#[derive(Debug, Clone)]
pub struct RowContext<T> {
    pub item: T,
    pub state_id: StateId,
    pub row_index: usize,
}

/// A worker's outcome for one item: a `CapacityError` drives AIMD backoff and
/// a re-queue; any other error is terminal for that item alone.
pub enum ItemOutcome<R, E> {
    Success(R),
    Capacity,
    Terminal(E),
}

/// The result the pool returns for each input position: `None` only if the
/// run was cancelled before that item was ever dispatched.
pub type PoolResult<R, E> = Option<Result<R, PoolItemError<E>>>;

#[derive(Debug, thiserror::Error)]
pub enum PoolItemError<E: std::fmt::Display + std::fmt::Debug> {
    #[error("item exceeded the capacity retry budget")]
    CapacityExhausted,
    #[error("{0}")]
    Terminal(E),
}

pub struct PooledExecutor {
    config: PoolConfig,
}

impl PooledExecutor {
    pub fn new(config: PoolConfig) -> Result<Self, PoolConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Runs `f` over every item in `items` with up to `pool_size` concurrent
    /// workers, AIMD-throttled dispatch, and a reorder buffer that returns
    /// results at their original input indices. Empty input returns empty
    /// output (§4.4).
    pub async fn run<T, R, E, F, Fut>(
        &self,
        items: Vec<RowContext<T>>,
        f: F,
        cancel: CancellationToken,
    ) -> Vec<PoolResult<R, E>>
    where
        T: Send + Clone + 'static,
        R: Send + 'static,
        E: Send + std::fmt::Display + std::fmt::Debug + 'static,
        F: Fn(RowContext<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ItemOutcome<R, E>> + Send + 'static,
    {
        if items.is_empty() {
            return Vec::new();
        }
        let total = items.len();
        let throttle = Arc::new(AimdThrottle::new(&self.config));
        let semaphore = Arc::new(Semaphore::new(self.config.pool_size));
        let f = Arc::new(f);
        let mut results: Vec<PoolResult<R, E>> = (0..total).map(|_| None).collect();
        let mut joins = JoinSet::new();
        let deadline_budget = Duration::from_secs(self.config.max_capacity_retry_seconds);

        for (index, item) in items.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let throttle = throttle.clone();
            let f = f.clone();
            let cancel = cancel.clone();
            let started = Instant::now();
            joins.spawn(async move {
                let _permit = permit;
                loop {
                    if cancel.is_cancelled() {
                        return (index, None);
                    }
                    tokio::time::sleep(Duration::from_millis(throttle.delay_ms())).await;
                    match f(item.clone()).await {
                        ItemOutcome::Success(value) => {
                            throttle.on_success();
                            return (index, Some(Ok(value)));
                        }
                        ItemOutcome::Capacity => {
                            throttle.on_capacity_error();
                            if started.elapsed() > deadline_budget {
                                return (index, Some(Err(PoolItemError::CapacityExhausted)));
                            }
                        }
                        ItemOutcome::Terminal(e) => {
                            return (index, Some(Err(PoolItemError::Terminal(e))));
                        }
                    }
                }
            });
        }

        while let Some(joined) = joins.join_next().await {
            if let Ok((index, outcome)) = joined {
                results[index] = outcome;
            }
        }
        results
    }
}
