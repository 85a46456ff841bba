//! Per-step retry policy for capability calls.
//!
//! The engine makes exactly one attempt per visited step; retrying is opt-in
//! through the step's own `retries` / `retryDelayMs` config fields.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::model::Step;
use crate::traits::StepContext;
use crate::{CapabilityError, Interrupted};

/// Tuning knobs read from a step's config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    /// Additional attempts after the first one.
    pub retries: u32,
    /// Base delay for exponential back-off between attempts.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Value) -> Self {
        let retries = config
            .get("retries")
            .and_then(Value::as_u64)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0);
        let base_delay = config
            .get("retryDelayMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO);
        Self { retries, base_delay }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .unwrap_or(Duration::MAX)
    }
}

/// Run `op`, re-running it on `Retryable` errors while the policy allows.
///
/// Back-off waits go through the execution's clock and end early with
/// [`Interrupted`] if the execution is cancelled.
pub(crate) async fn with_retry<T, F, Fut>(
    step: &Step,
    policy: RetryPolicy,
    ctx: &StepContext<'_>,
    mut op: F,
) -> Result<Result<T, CapabilityError>, Interrupted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut attempts = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(Ok(value)),

            Err(CapabilityError::Retryable(msg)) if attempts < policy.retries => {
                attempts += 1;
                let delay = policy.delay_for(attempts);

                warn!(
                    step_id = %step.id,
                    execution_id = %ctx.execution_id,
                    "retryable error (attempt {}/{}), retrying in {:?}: {}",
                    attempts, policy.retries, delay, msg
                );

                if !delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = ctx.cancel.cancelled() => return Err(Interrupted),
                        _ = ctx.clock.sleep(delay) => {}
                    }
                }
            }

            Err(CapabilityError::Retryable(msg)) if attempts > 0 => {
                return Ok(Err(CapabilityError::Retryable(format!(
                    "{msg} (gave up after {attempts} retries)"
                ))));
            }

            Err(err) => return Ok(Err(err)),
        }
    }
}
