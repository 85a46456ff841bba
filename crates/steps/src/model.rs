//! Step-level value objects.
//!
//! These types are owned by the workflow that contains them and have no
//! lifecycle of their own. They serialise to the camelCase JSON shape used
//! by workflow definition files and the event ingestion layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// StepKind
// ---------------------------------------------------------------------------

/// The five kinds of step a workflow can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Action,
    Condition,
    Delay,
    Webhook,
    Notification,
}

impl StepKind {
    pub const ALL: [StepKind; 5] = [
        Self::Action,
        Self::Condition,
        Self::Delay,
        Self::Webhook,
        Self::Notification,
    ];
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action       => write!(f, "action"),
            Self::Condition    => write!(f, "condition"),
            Self::Delay        => write!(f, "delay"),
            Self::Webhook      => write!(f, "webhook"),
            Self::Notification => write!(f, "notification"),
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A single unit of work within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique within the owning workflow.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub name: String,
    /// Free-form configuration interpreted by the executor for `kind`.
    #[serde(default)]
    pub config: Value,
    /// Successor on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,
    /// Successor on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error_step_id: Option<String>,
}

impl Step {
    /// Convenience constructor used heavily by tests.
    pub fn new(id: impl Into<String>, kind: StepKind, config: Value) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            config,
            next_step_id: None,
            on_error_step_id: None,
        }
    }

    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.next_step_id = Some(next.into());
        self
    }

    pub fn on_error(mut self, step_id: impl Into<String>) -> Self {
        self.on_error_step_id = Some(step_id.into());
        self
    }

    pub fn has_error_successor(&self) -> bool {
        self.on_error_step_id.is_some()
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Comparators understood by the condition evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEquals,
    LessThan,
    LessThanOrEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Exists,
}

/// A single field / comparator / literal predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dot-separated path into the evaluated data (`client.tier`, `items.0`).
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::Equals, value)
    }

    pub fn not_equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::NotEquals, value)
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::GreaterThan, serde_json::json!(value))
    }

    pub fn less_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::LessThan, serde_json::json!(value))
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, ConditionOperator::Contains, Value::String(value.to_string()))
    }

    pub fn in_list(field: &str, values: Vec<Value>) -> Self {
        Self::new(field, ConditionOperator::In, Value::Array(values))
    }

    pub fn exists(field: &str) -> Self {
        Self::new(field, ConditionOperator::Exists, Value::Null)
    }
}
