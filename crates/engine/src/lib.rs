//! `engine` crate: workflow store, trigger dispatch, the execution state
//! machine and the step-execution loop.
//!
//! Side effects never happen here. Steps are dispatched to the executors of
//! the `steps` crate, which talk to the host through injected capabilities.

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod history;
pub mod models;
pub mod persistence;
pub mod store;
pub mod tracker;

pub use dispatch::{trigger_matches, TriggerDispatcher};
pub use engine::{EngineBuilder, ExecutionHandle, WorkflowEngine};
pub use error::EngineError;
pub use executor::EngineConfig;
pub use graph::{validate_steps, CompiledWorkflow, StepGraph};
pub use models::{Execution, ExecutionStatus, StepResult, Trigger, Workflow, WorkflowDefinition};
pub use persistence::{NoopPersistence, PersistenceError, PersistenceHook};
pub use store::WorkflowStore;
pub use tracker::{ExecutionTracker, STEP_LIMIT_EXCEEDED};
