//! Bounded retry with exponential backoff (§4.9).
//!
//! Generalizes the fixed 3-attempt/15ms-per-attempt backoff loop this
//! workspace's persistence layer used for transient database errors into a
//! configurable policy shared by transforms, sinks, and calls.

use crate::errors::{EngineError, ErrorReason};
use crate::model::{NodeId, NodeStateStatus, StateId, TokenId};
use crate::recorder::Recorder;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(50), max_delay: Duration::from_secs(30) }
    }
}

impl RetryPolicy {
    /// Delay before attempt `k` (0-based), `base_delay * 2^k` capped at `max_delay`.
    pub fn delay_for_attempt(&self, k: u32) -> Duration {
        let scaled = self.base_delay.saturating_mul(1u32.checked_shl(k).unwrap_or(u32::MAX));
        scaled.min(self.max_delay)
    }
}

/// Retries `f` up to `policy.max_attempts` times, sleeping
/// `policy.delay_for_attempt(k)` between attempts. `f` receives the 0-based
/// attempt number. Retry is orthogonal to pooled execution: each call to
/// this function is local to whichever worker invokes it.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut f: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 >= policy.max_attempts {
                    return Err(err);
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// One attempt's outcome, as classified by the caller of
/// [`retry_with_node_states`]: `output_json` is whatever should be recorded
/// as the NodeState's `output_data` on success (`None` when the collaborator
/// kind doesn't record one, e.g. sinks).
pub enum AttemptOutcome<T> {
    Success { value: T, output_json: Option<Value> },
    Failure { message: String, retryable: bool, details: Option<Value> },
}

/// Runs `run_attempt` once per retry attempt, opening a fresh `NodeState` for
/// every attempt (`attempt = k`) and completing *that* NodeState before
/// deciding whether to retry (§4.9: "each attempt produces a new NodeState
/// with attempt = k; the previous attempt remains in status=failed"). Shared
/// by the transform and sink executors so the per-attempt audit bracketing
/// lives in one place rather than being duplicated per collaborator kind.
///
/// `run_attempt` receives the freshly opened `state_id` and the 0-based
/// attempt number, and is responsible for building its own `PluginContext`
/// from that `state_id` and invoking the collaborator.
#[allow(clippy::too_many_arguments)]
pub async fn retry_with_node_states<T, F, Fut>(
    policy: &RetryPolicy,
    recorder: &dyn Recorder,
    token_id: TokenId,
    node_id: NodeId,
    step_index: i64,
    input_value: &Value,
    mut run_attempt: F,
) -> Result<T, EngineError>
where
    F: FnMut(StateId, i32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    let mut attempt_number = 0i32;
    loop {
        let state = recorder.begin_node_state(token_id, node_id, step_index, input_value, attempt_number, None)?;
        let started = Instant::now();
        let outcome = run_attempt(state.state_id, attempt_number).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            AttemptOutcome::Success { value, output_json } => {
                recorder.complete_node_state(
                    state.state_id,
                    NodeStateStatus::Completed,
                    output_json.as_ref(),
                    Some(duration_ms),
                    None,
                    None,
                )?;
                return Ok(value);
            }
            AttemptOutcome::Failure { message, retryable, details } => {
                let mut reason = ErrorReason::terminal(message.clone());
                reason.retryable = retryable;
                if let Some(details) = details {
                    reason = reason.with_details(details);
                }
                recorder.complete_node_state(
                    state.state_id,
                    NodeStateStatus::Failed,
                    None,
                    Some(duration_ms),
                    Some(reason.to_json()),
                    None,
                )?;

                if !retryable || attempt_number + 1 >= policy.max_attempts as i32 {
                    return Err(if retryable {
                        EngineError::PluginRetryable(message)
                    } else {
                        EngineError::PluginTerminal(message)
                    });
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt_number as u32)).await;
                attempt_number += 1;
            }
        }
    }
}
