//! In-memory workflow store.
//!
//! Read-mostly: lookups share a read lock, mutations take the write lock.
//! Entries are `Arc`s that are swapped, never mutated in place, so an
//! execution holding a workflow keeps a consistent definition even if the
//! workflow is edited or removed while it runs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::graph::CompiledWorkflow;
use crate::models::{Workflow, WorkflowDefinition};
use crate::EngineError;

#[derive(Debug, Default)]
pub struct WorkflowStore {
    workflows: RwLock<HashMap<Uuid, Arc<CompiledWorkflow>>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a new workflow under a fresh ID.
    pub async fn register(
        &self,
        definition: WorkflowDefinition,
        now: DateTime<Utc>,
    ) -> Result<Arc<CompiledWorkflow>, EngineError> {
        let workflow = Workflow::from_definition(Uuid::new_v4(), definition, now);
        self.insert(workflow).await
    }

    /// Store an already-identified workflow (used when restoring), replacing
    /// any entry with the same ID.
    pub async fn insert(&self, workflow: Workflow) -> Result<Arc<CompiledWorkflow>, EngineError> {
        let compiled = Arc::new(CompiledWorkflow::compile(workflow)?);
        self.workflows
            .write()
            .await
            .insert(compiled.workflow().id, Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Replace a workflow wholesale, keeping its ID and creation time.
    pub async fn update(
        &self,
        id: Uuid,
        definition: WorkflowDefinition,
        now: DateTime<Utc>,
    ) -> Result<Arc<CompiledWorkflow>, EngineError> {
        let mut workflows = self.workflows.write().await;
        let existing = workflows.get(&id).ok_or(EngineError::WorkflowNotFound(id))?;

        let mut workflow = Workflow::from_definition(id, definition, now);
        workflow.created_at = existing.workflow().created_at;

        let compiled = Arc::new(CompiledWorkflow::compile(workflow)?);
        workflows.insert(id, Arc::clone(&compiled));
        Ok(compiled)
    }

    pub async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Arc<CompiledWorkflow>, EngineError> {
        let mut workflows = self.workflows.write().await;
        let existing = workflows.get(&id).ok_or(EngineError::WorkflowNotFound(id))?;

        let mut workflow = existing.workflow().clone();
        workflow.is_active = active;
        workflow.updated_at = now;

        let compiled = Arc::new(CompiledWorkflow::compile(workflow)?);
        workflows.insert(id, Arc::clone(&compiled));
        Ok(compiled)
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<CompiledWorkflow>> {
        self.workflows.write().await.remove(&id)
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<CompiledWorkflow>> {
        self.workflows.read().await.get(&id).cloned()
    }

    /// All workflows, oldest first.
    pub async fn list(&self) -> Vec<Arc<CompiledWorkflow>> {
        let mut all: Vec<_> = self.workflows.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            let (a, b) = (a.workflow(), b.workflow());
            a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    pub async fn len(&self) -> usize {
        self.workflows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workflows.read().await.is_empty()
    }
}
