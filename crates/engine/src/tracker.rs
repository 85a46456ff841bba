//! Execution state machine.
//!
//! ```text
//! pending ──► running ──► completed
//!    │           ├──────► failed
//!    └───────────┴──────► cancelled
//! ```
//!
//! The tracker is the only thing that mutates an [`Execution`]. Step results
//! are append-only, `started_at` is set once on `pending → running`, and
//! `completed_at` once on entering a terminal state.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Execution, ExecutionStatus, StepResult};
use crate::EngineError;

/// Failure reason prefix used when the step ceiling is hit.
pub const STEP_LIMIT_EXCEEDED: &str = "step limit exceeded";

/// Whether the tracker allowed another step to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAdmission {
    Admitted,
    /// The ceiling was reached; the execution is now `failed`.
    LimitExceeded,
}

#[derive(Debug)]
pub struct ExecutionTracker {
    execution: Execution,
    steps_started: usize,
    max_steps: usize,
}

impl ExecutionTracker {
    /// Create a `pending` execution.
    pub fn new(workflow_id: Uuid, trigger_data: Value, max_steps: usize, now: DateTime<Utc>) -> Self {
        Self {
            execution: Execution {
                id: Uuid::new_v4(),
                workflow_id,
                status: ExecutionStatus::Pending,
                trigger_data,
                current_step_id: None,
                step_results: Vec::new(),
                created_at: now,
                started_at: None,
                completed_at: None,
                error: None,
            },
            steps_started: 0,
            max_steps,
        }
    }

    /// Pick up a published snapshot again, e.g. to close out an execution
    /// whose task died.
    pub fn resume(execution: Execution, max_steps: usize) -> Self {
        Self {
            steps_started: execution.step_results.len(),
            execution,
            max_steps,
        }
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    pub fn into_execution(self) -> Execution {
        self.execution
    }

    pub fn status(&self) -> ExecutionStatus {
        self.execution.status
    }

    pub fn steps_started(&self) -> usize {
        self.steps_started
    }

    /// `pending → running`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(ExecutionStatus::Running)?;
        self.execution.started_at = Some(now);
        Ok(())
    }

    /// Mark `step_id` as the step in execution, enforcing the step ceiling.
    pub fn begin_step(&mut self, step_id: &str, now: DateTime<Utc>) -> Result<StepAdmission, EngineError> {
        self.require(ExecutionStatus::Running)?;

        if self.steps_started >= self.max_steps {
            let reason = format!(
                "{STEP_LIMIT_EXCEEDED}: more than {} steps executed",
                self.max_steps
            );
            self.fail(reason, now)?;
            return Ok(StepAdmission::LimitExceeded);
        }

        self.steps_started += 1;
        self.execution.current_step_id = Some(step_id.to_owned());
        Ok(StepAdmission::Admitted)
    }

    /// Append the outcome of the current step.
    pub fn record(&mut self, result: StepResult) -> Result<(), EngineError> {
        self.require(ExecutionStatus::Running)?;
        self.execution.step_results.push(result);
        Ok(())
    }

    /// `running → completed`.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(ExecutionStatus::Completed)?;
        self.finish(now);
        Ok(())
    }

    /// `running → failed`, recording the top-level reason.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(ExecutionStatus::Failed)?;
        self.execution.error = Some(reason.into());
        self.finish(now);
        Ok(())
    }

    /// `pending | running → cancelled`.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(ExecutionStatus::Cancelled)?;
        self.finish(now);
        Ok(())
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.execution.current_step_id = None;
        self.execution.completed_at = Some(now);
    }

    fn require(&self, expected: ExecutionStatus) -> Result<(), EngineError> {
        if self.execution.status == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: self.execution.status,
                to: expected,
            })
        }
    }

    fn transition(&mut self, to: ExecutionStatus) -> Result<(), EngineError> {
        use ExecutionStatus::*;

        let from = self.execution.status;
        let allowed = matches!(
            (from, to),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        );
        if !allowed {
            return Err(EngineError::InvalidTransition { from, to });
        }

        self.execution.status = to;
        Ok(())
    }
}
