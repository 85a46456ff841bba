//! The `StepExecutor` trait: the contract every step kind must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::Clock;
use crate::condition::{lookup_path, Lookup};
use crate::model::Step;
use crate::Interrupted;

/// What a single step execution is handed.
///
/// Defined here (in the steps crate) so both the engine and individual
/// executors can import it without a circular dependency.
pub struct StepContext<'a> {
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    /// Payload of the event that started the execution.
    pub trigger_data: &'a Value,
    /// Outputs of previously executed steps, an object keyed by step id.
    pub outputs: &'a Value,
    pub clock: &'a dyn Clock,
    /// Fires when the execution is cancelled.
    pub cancel: &'a CancellationToken,
}

impl StepContext<'_> {
    /// The context as a single JSON document, used as the webhook payload.
    pub fn to_payload(&self) -> Value {
        json!({
            "workflowId": self.workflow_id,
            "executionId": self.execution_id,
            "trigger": self.trigger_data,
            "steps": self.outputs,
        })
    }
}

/// `steps.<id>.<path>` reads a prior step's output, `trigger.<path>` reads
/// the trigger data explicitly, and any other path reads the trigger data.
impl Lookup for StepContext<'_> {
    fn lookup(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if let Some(rest) = path.strip_prefix("steps.") {
            return lookup_path(self.outputs, rest);
        }
        if let Some(rest) = path.strip_prefix("trigger.") {
            return lookup_path(self.trigger_data, rest);
        }
        lookup_path(self.trigger_data, path)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Recorded status of an executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Which successor the engine should follow after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Follow `next_step_id`; finish the execution if there is none.
    Next,
    /// Follow `on_error_step_id`; fail the execution if there is none.
    OnError,
    /// Finish the execution successfully here.
    Halt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub output: Value,
    pub error: Option<String>,
    pub route: Route,
}

impl StepOutcome {
    pub fn success(output: Value) -> Self {
        Self {
            status: StepStatus::Success,
            output,
            error: None,
            route: Route::Next,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failure,
            output: Value::Null,
            error: Some(reason.into()),
            route: Route::OnError,
        }
    }

    /// A successful step that deliberately takes the error branch.
    pub fn divert(output: Value) -> Self {
        Self {
            status: StepStatus::Success,
            output,
            error: None,
            route: Route::OnError,
        }
    }

    /// A step that stops the execution gracefully.
    pub fn skipped(output: Value) -> Self {
        Self {
            status: StepStatus::Skipped,
            output,
            error: None,
            route: Route::Halt,
        }
    }
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

/// The core executor trait.
///
/// Implementations interpret `step.config`, perform the step's work and
/// decide the route to the next step. Failures are reported as
/// [`StepOutcome::failure`]; `Err` is reserved for cancellation.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &Step, ctx: &StepContext<'_>) -> Result<StepOutcome, Interrupted>;
}
