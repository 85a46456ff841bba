//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow and an execution
//! look like in memory. They serialise to the camelCase JSON used by
//! workflow files and by persistence hooks.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use steps::{Condition, Step, StepStatus};

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// The event name plus the predicate that decides whether a workflow starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub event: String,
    /// ANDed; empty means "always, when the event name matches".
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Trigger {
    pub fn on(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            conditions: Vec::new(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

fn default_active() -> bool {
    true
}

/// What a caller supplies to register or replace a workflow.
///
/// Identity and timestamps are assigned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, trigger: Trigger, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            trigger,
            steps,
            is_active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// A registered workflow. Immutable once created; edits replace it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub trigger: Trigger,
    /// The first step is the entry point.
    pub steps: Vec<Step>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn from_definition(id: Uuid, definition: WorkflowDefinition, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: definition.name,
            description: definition.description,
            trigger: definition.trigger,
            steps: definition.steps,
            is_active: definition.is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Lifecycle of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending   => write!(f, "pending"),
            Self::Running   => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed    => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One entry per executed step. Never rewritten once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub output: Value,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// One run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    /// Weak reference; the workflow may since have been edited or removed.
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub trigger_data: Value,
    pub current_step_id: Option<String>,
    pub step_results: Vec<StepResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set only when `status` is `Failed`.
    pub error: Option<String>,
}

impl Execution {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The most recent result recorded for `step_id`.
    pub fn result_for(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.iter().rev().find(|r| r.step_id == step_id)
    }

    /// Step ids in the order they ran.
    pub fn visited(&self) -> Vec<&str> {
        self.step_results.iter().map(|r| r.step_id.as_str()).collect()
    }
}
