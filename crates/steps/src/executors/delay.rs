//! `delay` steps: suspend the execution on the clock.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::model::Step;
use crate::traits::{StepContext, StepExecutor, StepOutcome};
use crate::Interrupted;

/// Config: `{ "delayMs": u64 }`.
///
/// The wait is a timer registration on the execution's clock, raced against
/// the cancellation signal.
pub struct DelayExecutor;

#[async_trait]
impl StepExecutor for DelayExecutor {
    async fn execute(&self, step: &Step, ctx: &StepContext<'_>) -> Result<StepOutcome, Interrupted> {
        let Some(delay_ms) = step.config.get("delayMs").and_then(Value::as_u64) else {
            return Ok(StepOutcome::failure(
                "delay step requires a non-negative integer `delayMs`",
            ));
        };

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(Interrupted),
            _ = ctx.clock.sleep(Duration::from_millis(delay_ms)) => {
                Ok(StepOutcome::success(json!({ "delayedMs": delay_ms })))
            }
        }
    }
}
