//! Built-in executors, one per [`StepKind`].

mod action;
mod condition;
mod delay;
mod notification;
mod retry;
mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

pub use action::ActionExecutor;
pub use condition::ConditionExecutor;
pub use delay::DelayExecutor;
pub use notification::NotificationExecutor;
pub use webhook::{WebhookExecutor, DEFAULT_WEBHOOK_TIMEOUT};

use crate::capability::Capabilities;
use crate::model::StepKind;
use crate::traits::StepExecutor;

/// Maps each step kind to the executor that runs it.
pub type ExecutorRegistry = HashMap<StepKind, Arc<dyn StepExecutor>>;

/// Build the registry of built-in executors backed by `capabilities`.
pub fn builtin_executors(capabilities: &Capabilities) -> ExecutorRegistry {
    let mut registry: ExecutorRegistry = HashMap::with_capacity(StepKind::ALL.len());
    registry.insert(
        StepKind::Action,
        Arc::new(ActionExecutor::new(capabilities.actions.clone())),
    );
    registry.insert(StepKind::Condition, Arc::new(ConditionExecutor));
    registry.insert(StepKind::Delay, Arc::new(DelayExecutor));
    registry.insert(
        StepKind::Webhook,
        Arc::new(WebhookExecutor::new(capabilities.webhook.clone())),
    );
    registry.insert(
        StepKind::Notification,
        Arc::new(NotificationExecutor::new(capabilities.notifications.clone())),
    );
    registry
}
