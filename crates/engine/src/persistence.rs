//! Injectable persistence hook.
//!
//! The engine keeps all state in memory. A host that wants durability wires
//! in a [`PersistenceHook`]; the engine calls it after every workflow change
//! and every execution transition. Hook failures are logged and never change
//! how an execution proceeds.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Execution, Workflow};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("persistence backend error: {0}")]
    Backend(String),
}

/// Load/save hook over the workflow and execution data model.
///
/// Every method defaults to a no-op so hosts only implement what they store.
#[async_trait]
pub trait PersistenceHook: Send + Sync {
    async fn save_workflow(&self, _workflow: &Workflow) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn delete_workflow(&self, _id: Uuid) -> Result<(), PersistenceError> {
        Ok(())
    }

    /// Called with a full snapshot after every execution transition.
    async fn save_execution(&self, _execution: &Execution) -> Result<(), PersistenceError> {
        Ok(())
    }

    /// Workflows to re-register on [`crate::WorkflowEngine::restore`].
    async fn load_workflows(&self) -> Result<Vec<Workflow>, PersistenceError> {
        Ok(Vec::new())
    }
}

/// The default hook: stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

#[async_trait]
impl PersistenceHook for NoopPersistence {}
