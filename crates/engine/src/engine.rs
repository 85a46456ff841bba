//! The engine facade: one explicitly constructed instance owns the workflow
//! store, the execution history and the injected host collaborators.
//!
//! Every execution runs as its own tokio task. Callers either await the
//! final [`Execution`] (`trigger_workflow`, `dispatch_event`) or keep an
//! [`ExecutionHandle`] to observe and cancel it (`start_workflow`).

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use steps::{builtin_executors, Capabilities, Clock, ExecutorRegistry, StepExecutor, StepKind, TokioClock};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::dispatch::TriggerDispatcher;
use crate::executor::{EngineConfig, Runner};
use crate::graph::CompiledWorkflow;
use crate::history::ExecutionHistory;
use crate::models::{Execution, Workflow, WorkflowDefinition};
use crate::persistence::{NoopPersistence, PersistenceHook};
use crate::store::WorkflowStore;
use crate::tracker::ExecutionTracker;
use crate::EngineError;

// ---------------------------------------------------------------------------
// ExecutionHandle
// ---------------------------------------------------------------------------

/// A running execution.
///
/// Dropping the handle does not stop the execution.
#[derive(Debug)]
pub struct ExecutionHandle {
    id: Uuid,
    cancel: CancellationToken,
    join: JoinHandle<Result<Execution, EngineError>>,
}

impl ExecutionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation; honoured at the next safe point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the execution to reach a terminal state.
    pub async fn wait(self) -> Result<Execution, EngineError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(EngineError::ExecutionAborted {
                execution_id: self.id,
                message: e.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct EngineBuilder {
    capabilities: Capabilities,
    overrides: Vec<(StepKind, Arc<dyn StepExecutor>)>,
    clock: Arc<dyn Clock>,
    persistence: Arc<dyn PersistenceHook>,
    config: EngineConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::default(),
            overrides: Vec::new(),
            clock: Arc::new(TokioClock),
            persistence: Arc::new(NoopPersistence),
            config: EngineConfig::default(),
        }
    }
}

impl EngineBuilder {
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replace the built-in executor for `kind`.
    pub fn executor(mut self, kind: StepKind, executor: Arc<dyn StepExecutor>) -> Self {
        self.overrides.push((kind, executor));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn PersistenceHook>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> WorkflowEngine {
        let mut executors: ExecutorRegistry = builtin_executors(&self.capabilities);
        executors.extend(self.overrides);

        let store = Arc::new(WorkflowStore::new());
        let history = ExecutionHistory::with_retention(self.config.max_retained_executions);
        WorkflowEngine {
            inner: Arc::new(EngineInner {
                dispatcher: TriggerDispatcher::new(Arc::clone(&store)),
                store,
                runner: Runner {
                    executors: Arc::new(executors),
                    clock: self.clock,
                    persistence: self.persistence,
                    history: Arc::new(history),
                },
                config: self.config,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

struct EngineInner {
    store: Arc<WorkflowStore>,
    dispatcher: TriggerDispatcher,
    runner: Runner,
    config: EngineConfig,
}

/// Cheap to clone; clones share the same store and history.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl WorkflowEngine {
    /// An engine with the built-in executors, the tokio clock and no
    /// persistence.
    pub fn new(capabilities: Capabilities, config: EngineConfig) -> Self {
        Self::builder().capabilities(capabilities).config(config).build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.inner.runner.clock.now()
    }

    async fn persist_workflow(&self, workflow: &Workflow) {
        if let Err(e) = self.inner.runner.persistence.save_workflow(workflow).await {
            warn!(workflow_id = %workflow.id, "failed to persist workflow: {e}");
        }
    }

    // ------ Workflow store ------

    /// Validate and store a workflow definition.
    ///
    /// # Errors
    /// [`EngineError::UnknownStepReference`] or
    /// [`EngineError::DuplicateStepId`] if the step graph is malformed.
    pub async fn register_workflow(&self, definition: WorkflowDefinition) -> Result<Workflow, EngineError> {
        let compiled = self.inner.store.register(definition, self.now()).await?;
        let workflow = compiled.workflow().clone();
        info!(workflow_id = %workflow.id, name = %workflow.name, event = %workflow.trigger.event, "workflow registered");
        self.persist_workflow(&workflow).await;
        Ok(workflow)
    }

    pub async fn list_workflows(&self) -> Vec<Workflow> {
        self.inner
            .store
            .list()
            .await
            .iter()
            .map(|c| c.workflow().clone())
            .collect()
    }

    pub async fn get_workflow(&self, id: Uuid) -> Option<Workflow> {
        self.inner.store.get(id).await.map(|c| c.workflow().clone())
    }

    pub async fn update_workflow(&self, id: Uuid, definition: WorkflowDefinition) -> Result<Workflow, EngineError> {
        let compiled = self.inner.store.update(id, definition, self.now()).await?;
        let workflow = compiled.workflow().clone();
        info!(workflow_id = %id, "workflow updated");
        self.persist_workflow(&workflow).await;
        Ok(workflow)
    }

    pub async fn set_workflow_active(&self, id: Uuid, active: bool) -> Result<Workflow, EngineError> {
        let compiled = self.inner.store.set_active(id, active, self.now()).await?;
        let workflow = compiled.workflow().clone();
        info!(workflow_id = %id, active, "workflow activation changed");
        self.persist_workflow(&workflow).await;
        Ok(workflow)
    }

    /// Remove a workflow. Executions already running keep their definition.
    pub async fn remove_workflow(&self, id: Uuid) -> bool {
        if self.inner.store.remove(id).await.is_none() {
            return false;
        }
        info!(workflow_id = %id, "workflow removed");
        if let Err(e) = self.inner.runner.persistence.delete_workflow(id).await {
            warn!(workflow_id = %id, "failed to delete persisted workflow: {e}");
        }
        true
    }

    /// Re-register every workflow the persistence hook returns, keeping
    /// their IDs. Returns how many were restored.
    pub async fn restore(&self) -> Result<usize, EngineError> {
        let workflows = self.inner.runner.persistence.load_workflows().await?;
        let mut restored = 0;
        for workflow in workflows {
            let id = workflow.id;
            match self.inner.store.insert(workflow).await {
                Ok(_) => restored += 1,
                Err(e) => warn!(workflow_id = %id, "skipping persisted workflow: {e}"),
            }
        }
        info!(restored, "workflows restored");
        Ok(restored)
    }

    // ------ Execution ------

    async fn launch(&self, workflow: Arc<CompiledWorkflow>, data: Value) -> ExecutionHandle {
        let tracker = ExecutionTracker::new(
            workflow.workflow().id,
            data,
            self.inner.config.max_steps_per_execution,
            self.now(),
        );
        let id = tracker.execution().id;
        let cancel = CancellationToken::new();
        let runner = self.inner.runner.clone();
        let token = cancel.clone();

        runner.publish(tracker.execution()).await;
        runner.history.admit(id, cancel.clone()).await;

        // The step loop runs in its own task so a panicking capability is
        // contained: the supervising task still closes out the execution.
        let join = tokio::spawn(async move {
            let worker = tokio::spawn({
                let runner = runner.clone();
                async move { runner.run(workflow, tracker, token).await }
            });
            let result = match worker.await {
                Ok(result) => result,
                Err(e) => runner.abort(id, join_error_message(e)).await,
            };
            runner.history.retire(id).await;
            result
        });

        ExecutionHandle { id, cancel, join }
    }

    /// Start `id` in the background. `None` if the workflow is absent or
    /// inactive.
    pub async fn start_workflow(&self, id: Uuid, data: Value) -> Option<ExecutionHandle> {
        let workflow = self.inner.store.get(id).await?;
        if !workflow.workflow().is_active {
            info!(workflow_id = %id, "workflow inactive, not starting");
            return None;
        }
        Some(self.launch(workflow, data).await)
    }

    /// Run `id` to a terminal state. `Ok(None)` if the workflow is absent or
    /// inactive.
    pub async fn trigger_workflow(&self, id: Uuid, data: Value) -> Result<Option<Execution>, EngineError> {
        match self.start_workflow(id, data).await {
            Some(handle) => handle.wait().await.map(Some),
            None => Ok(None),
        }
    }

    /// Start every active workflow whose trigger accepts the event and wait
    /// for all of them. Executions run concurrently; the result is ordered
    /// like [`WorkflowEngine::list_workflows`].
    ///
    /// One execution going wrong never hides the others: an execution whose
    /// task died is returned as `failed`, and one that cannot be accounted
    /// for at all is logged and left out.
    #[instrument(skip(self, data))]
    pub async fn dispatch_event(&self, event: &str, data: Value) -> Result<Vec<Execution>, EngineError> {
        let matched = self.inner.dispatcher.matching(event, &data).await;
        info!(event, matched = matched.len(), "event dispatched");

        let mut handles = Vec::with_capacity(matched.len());
        for workflow in matched {
            handles.push(self.launch(workflow, data.clone()).await);
        }

        let executions = join_all(handles.into_iter().map(ExecutionHandle::wait))
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(execution) => Some(execution),
                Err(e) => {
                    error!(event, "execution lost during dispatch: {e}");
                    None
                }
            })
            .collect();
        Ok(executions)
    }

    /// Request cancellation of a running execution. `false` if it is unknown
    /// or already finished.
    pub async fn cancel_execution(&self, id: Uuid) -> bool {
        self.inner.runner.history.cancel(id).await
    }

    /// Latest snapshot of an execution, running or finished.
    pub async fn get_execution(&self, id: Uuid) -> Option<Execution> {
        self.inner.runner.history.get(id).await
    }

    pub async fn list_executions(&self, workflow_id: Option<Uuid>) -> Vec<Execution> {
        self.inner.runner.history.list(workflow_id).await
    }

    /// Forget every finished execution held in memory. Returns how many were
    /// dropped.
    pub async fn clear_finished_executions(&self) -> usize {
        self.inner.runner.history.clear_finished().await
    }
}

fn join_error_message(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    match payload.downcast_ref::<&str>() {
        Some(msg) => format!("panicked: {msg}"),
        None => match payload.downcast_ref::<String>() {
            Some(msg) => format!("panicked: {msg}"),
            None => "panicked".to_string(),
        },
    }
}
