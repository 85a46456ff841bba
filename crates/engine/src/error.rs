//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::models::ExecutionStatus;
use crate::persistence::PersistenceError;

/// Errors produced by the workflow engine (definition validation + execution
/// bookkeeping). Step failures are not errors: they are recorded on the
/// execution and routed through the step graph.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Definition errors ------

    /// Two or more steps share the same ID.
    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    /// A successor field references a step ID that doesn't exist in the workflow.
    #[error("step '{step_id}' references unknown step '{reference}' ({field})")]
    UnknownStepReference {
        step_id: String,
        reference: String,
        field: &'static str,
    },

    // ------ Lookup errors ------

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    // ------ Execution errors ------

    /// The tracker was asked for a transition its state machine forbids.
    #[error("invalid execution transition from {from} to {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// The task driving an execution panicked or was aborted.
    #[error("execution {execution_id} aborted: {message}")]
    ExecutionAborted {
        execution_id: Uuid,
        message: String,
    },

    /// Error from the injected persistence hook.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}
