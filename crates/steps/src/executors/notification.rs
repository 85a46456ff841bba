//! `notification` steps: render a message and hand it to the sink.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::capability::{Notification, NotificationSink};
use crate::model::Step;
use crate::template::render;
use crate::traits::{StepContext, StepExecutor, StepOutcome};
use crate::Interrupted;

/// Config: `{ "message": template, "channel"?: string }`.
///
/// Rendering never fails; unresolved placeholders stay in the text. Only an
/// unavailable or erroring sink fails the step.
pub struct NotificationExecutor {
    sink: Option<Arc<dyn NotificationSink>>,
}

impl NotificationExecutor {
    pub fn new(sink: Option<Arc<dyn NotificationSink>>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl StepExecutor for NotificationExecutor {
    async fn execute(&self, step: &Step, ctx: &StepContext<'_>) -> Result<StepOutcome, Interrupted> {
        let Some(sink) = &self.sink else {
            return Ok(StepOutcome::failure("notification sink unavailable"));
        };

        let template = match step.config.get("message") {
            Some(Value::String(s)) => s.as_str(),
            _ => return Ok(StepOutcome::failure("notification step requires a string `message`")),
        };
        let notification = Notification {
            message: render(template, ctx),
            channel: step
                .config
                .get("channel")
                .and_then(Value::as_str)
                .map(|c| render(c, ctx)),
        };

        match sink.send(&notification).await {
            Ok(()) => Ok(StepOutcome::success(json!({
                "message": notification.message,
                "channel": notification.channel,
            }))),
            Err(err) => Ok(StepOutcome::failure(format!(
                "notification delivery failed: {}",
                err.message()
            ))),
        }
    }
}
