//! `action` steps: invoke a host-supplied named operation.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::retry::{with_retry, RetryPolicy};
use crate::capability::ActionRegistry;
use crate::model::Step;
use crate::template::render_value;
use crate::traits::{StepContext, StepExecutor, StepOutcome};
use crate::Interrupted;

/// Config: `{ "action": name, "params"?: any, "retries"?: n, "retryDelayMs"?: ms }`.
pub struct ActionExecutor {
    actions: ActionRegistry,
}

impl ActionExecutor {
    pub fn new(actions: ActionRegistry) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl StepExecutor for ActionExecutor {
    async fn execute(&self, step: &Step, ctx: &StepContext<'_>) -> Result<StepOutcome, Interrupted> {
        let Some(name) = step.config.get("action").and_then(Value::as_str) else {
            return Ok(StepOutcome::failure("action step requires a string `action` field"));
        };
        let Some(handler) = self.actions.get(name) else {
            return Ok(StepOutcome::failure(format!("unknown action '{name}'")));
        };

        let params = render_value(step.config.get("params").unwrap_or(&Value::Null), ctx);
        let policy = RetryPolicy::from_config(&step.config);
        debug!(step_id = %step.id, action = name, "invoking action");

        match with_retry(step, policy, ctx, || handler.call(params.clone())).await? {
            Ok(output) => Ok(StepOutcome::success(output)),
            Err(err) => Ok(StepOutcome::failure(format!(
                "action '{name}' failed: {}",
                err.message()
            ))),
        }
    }
}
