//! The step-execution loop.
//!
//! `Runner` drives one execution from `pending` to a terminal state:
//! 1. Starts at the workflow's entry step.
//! 2. Dispatches each step to the executor registered for its kind.
//! 3. Records the outcome, then follows `next` or `on_error` as the outcome
//!    routes it.
//! 4. Publishes a snapshot after every transition to the history and the
//!    persistence hook.
//!
//! Steps run strictly one after another; a step is recorded in full or not
//! at all.

use std::sync::Arc;

use serde_json::{Map, Value};
use steps::{
    Clock, ExecutorRegistry, Interrupted, Route, StepContext, StepOutcome, StepStatus,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::graph::CompiledWorkflow;
use crate::history::{ExecutionHistory, DEFAULT_RETAINED_EXECUTIONS};
use crate::models::{Execution, ExecutionStatus, StepResult};
use crate::persistence::PersistenceHook;
use crate::tracker::{ExecutionTracker, StepAdmission};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ceiling on steps run by one execution; bounds cyclic step graphs.
    pub max_steps_per_execution: usize,
    /// Finished executions kept in memory for `get_execution` /
    /// `list_executions`.
    pub max_retained_executions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps_per_execution: 1000,
            max_retained_executions: DEFAULT_RETAINED_EXECUTIONS,
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Everything an execution task needs; cheap to clone into a spawned task.
#[derive(Clone)]
pub(crate) struct Runner {
    pub executors: Arc<ExecutorRegistry>,
    pub clock: Arc<dyn Clock>,
    pub persistence: Arc<dyn PersistenceHook>,
    pub history: Arc<ExecutionHistory>,
}

impl Runner {
    /// Store the latest snapshot and hand it to the persistence hook.
    pub async fn publish(&self, execution: &Execution) {
        self.history.publish(execution).await;
        if let Err(e) = self.persistence.save_execution(execution).await {
            warn!(execution_id = %execution.id, "failed to persist execution snapshot: {e}");
        }
    }

    /// Close out an execution whose task died before reaching a terminal
    /// state, recording `reason` as the failure.
    pub async fn abort(&self, id: Uuid, reason: String) -> Result<Execution, EngineError> {
        let snapshot = self.history.get(id).await.ok_or_else(|| EngineError::ExecutionAborted {
            execution_id: id,
            message: reason.clone(),
        })?;
        if snapshot.is_terminal() {
            return Ok(snapshot);
        }

        let mut tracker = ExecutionTracker::resume(snapshot, usize::MAX);
        let now = self.clock.now();
        if tracker.status() == ExecutionStatus::Pending {
            tracker.start(now)?;
        }
        tracker.fail(format!("execution aborted: {reason}"), now)?;
        self.publish(tracker.execution()).await;

        let execution = tracker.into_execution();
        error!(execution_id = %id, "execution aborted: {reason}");
        Ok(execution)
    }

    /// Run the execution to a terminal state.
    ///
    /// # Errors
    /// Only tracker bookkeeping violations surface as `Err`; every step
    /// failure is recorded on the returned execution instead.
    #[instrument(
        name = "execution",
        skip_all,
        fields(workflow_id = %workflow.workflow().id, execution_id = %tracker.execution().id)
    )]
    pub async fn run(
        &self,
        workflow: Arc<CompiledWorkflow>,
        mut tracker: ExecutionTracker,
        cancel: CancellationToken,
    ) -> Result<Execution, EngineError> {
        if cancel.is_cancelled() {
            warn!("execution cancelled before it started");
            tracker.cancel(self.clock.now())?;
            self.publish(tracker.execution()).await;
            return Ok(tracker.into_execution());
        }

        tracker.start(self.clock.now())?;
        self.publish(tracker.execution()).await;
        info!(workflow = %workflow.workflow().name, "execution started");

        let workflow_id = workflow.workflow().id;
        let execution_id = tracker.execution().id;
        let trigger_data = tracker.execution().trigger_data.clone();
        let mut outputs = Value::Object(Map::new());
        let mut cursor = workflow.graph().entry();

        while let Some(position) = cursor {
            if cancel.is_cancelled() {
                warn!("execution cancelled between steps");
                tracker.cancel(self.clock.now())?;
                break;
            }

            let step = workflow.step(position);
            if tracker.begin_step(&step.id, self.clock.now())? == StepAdmission::LimitExceeded {
                error!(step_id = %step.id, steps = tracker.steps_started(), "step limit exceeded");
                break;
            }
            self.publish(tracker.execution()).await;

            // ------------------------------------------------------------------
            // Dispatch the step.
            // ------------------------------------------------------------------
            let started_at = self.clock.now();
            let outcome = match self.executors.get(&step.kind) {
                Some(executor) => {
                    let ctx = StepContext {
                        workflow_id,
                        execution_id,
                        trigger_data: &trigger_data,
                        outputs: &outputs,
                        clock: self.clock.as_ref(),
                        cancel: &cancel,
                    };
                    executor.execute(step, &ctx).await
                }
                None => Ok(StepOutcome::failure(format!(
                    "no executor registered for step type '{}'",
                    step.kind
                ))),
            };

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(Interrupted) => {
                    warn!(step_id = %step.id, "execution cancelled while step was suspended");
                    tracker.cancel(self.clock.now())?;
                    break;
                }
            };

            // ------------------------------------------------------------------
            // Record the outcome.
            // ------------------------------------------------------------------
            match outcome.status {
                StepStatus::Failure => warn!(
                    step_id = %step.id,
                    error = outcome.error.as_deref().unwrap_or_default(),
                    "step failed"
                ),
                status => debug!(step_id = %step.id, %status, "step finished"),
            }

            tracker.record(StepResult {
                step_id: step.id.clone(),
                status: outcome.status,
                output: outcome.output.clone(),
                error: outcome.error.clone(),
                started_at,
                completed_at: self.clock.now(),
            })?;

            if outcome.status != StepStatus::Failure {
                if let Value::Object(map) = &mut outputs {
                    map.insert(step.id.clone(), outcome.output);
                }
            }

            // ------------------------------------------------------------------
            // Resolve the successor.
            // ------------------------------------------------------------------
            let links = workflow.graph().links(position);
            cursor = match outcome.route {
                Route::Next => links.next,
                Route::Halt => None,
                Route::OnError => match links.on_error {
                    Some(handler) => {
                        debug!(step_id = %step.id, "routing to error successor");
                        Some(handler)
                    }
                    None => {
                        let reason = match outcome.error {
                            Some(err) => format!("step '{}' failed: {err}", step.id),
                            None => format!("step '{}' has no error successor", step.id),
                        };
                        tracker.fail(reason, self.clock.now())?;
                        None
                    }
                },
            };

            if cursor.is_some() {
                self.publish(tracker.execution()).await;
            }
        }

        if !tracker.status().is_terminal() {
            tracker.complete(self.clock.now())?;
        }
        self.publish(tracker.execution()).await;

        let execution = tracker.into_execution();
        match &execution.error {
            Some(reason) => error!(status = %execution.status, "execution finished: {reason}"),
            None => info!(
                status = %execution.status,
                steps = execution.step_results.len(),
                "execution finished"
            ),
        }
        Ok(execution)
    }
}
