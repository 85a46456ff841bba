//! Trigger matching for incoming domain events.

use std::sync::Arc;

use serde_json::Value;
use steps::evaluate_all;
use tracing::debug;

use crate::graph::CompiledWorkflow;
use crate::models::Workflow;
use crate::store::WorkflowStore;

/// `true` if `workflow` should start for `event` carrying `data`: it must be
/// active, subscribe to exactly this event name, and its trigger conditions
/// must hold against the event data.
pub fn trigger_matches(workflow: &Workflow, event: &str, data: &Value) -> bool {
    workflow.is_active
        && workflow.trigger.event == event
        && evaluate_all(&workflow.trigger.conditions, data)
}

/// Finds the workflows an event should start.
#[derive(Debug, Clone)]
pub struct TriggerDispatcher {
    store: Arc<WorkflowStore>,
}

impl TriggerDispatcher {
    pub fn new(store: Arc<WorkflowStore>) -> Self {
        Self { store }
    }

    /// Every active workflow whose trigger accepts the event, oldest first.
    pub async fn matching(&self, event: &str, data: &Value) -> Vec<Arc<CompiledWorkflow>> {
        let matched: Vec<_> = self
            .store
            .list()
            .await
            .into_iter()
            .filter(|c| trigger_matches(c.workflow(), event, data))
            .collect();

        debug!(event, matched = matched.len(), "trigger matching finished");
        matched
    }
}
