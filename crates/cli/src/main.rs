//! `automation-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: check a workflow definition file and print its step order.
//! - `run`: register workflow files, dispatch one event and print the
//!   resulting executions as JSON. With a state directory, a file whose
//!   workflow name is already persisted updates that workflow in place.

mod capabilities;
mod file_store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use engine::{validate_steps, EngineConfig, Execution, WorkflowDefinition, WorkflowEngine};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::capabilities::cli_capabilities;
use crate::file_store::JsonFileStore;

#[derive(Parser)]
#[command(
    name = "automation-engine",
    about = "Event-driven workflow automation engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Register workflows and dispatch a single event through them.
    Run {
        /// Workflow definition files; may be repeated.
        #[arg(long = "workflow", required = true)]
        workflows: Vec<PathBuf>,

        /// Event name to dispatch.
        #[arg(long)]
        event: String,

        /// Event payload as a JSON object.
        #[arg(long, default_value = "{}")]
        data: String,

        /// Persist workflows and executions as JSON under this directory.
        #[arg(long, env = "WORKFLOW_STATE_DIR")]
        state_dir: Option<PathBuf>,

        /// Step ceiling per execution.
        #[arg(long, env = "WORKFLOW_MAX_STEPS", default_value_t = 1000)]
        max_steps: usize,
    },
}

fn read_definition(path: &Path) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

fn validate(path: &Path) -> Result<()> {
    let definition = read_definition(path)?;
    let graph = validate_steps(&definition.steps)
        .with_context(|| format!("validation failed for {}", path.display()))?;

    let order: Vec<&str> = graph
        .reachable()
        .into_iter()
        .map(|i| definition.steps[i].id.as_str())
        .collect();
    println!("Workflow '{}' is valid. Step order: {order:?}", definition.name);

    let unreachable = definition.steps.len() - order.len();
    if unreachable > 0 {
        warn!(unreachable, "some steps can never run");
    }
    if graph.has_cycle() {
        warn!("step graph contains a cycle; executions are bounded by the step limit");
    }
    Ok(())
}

async fn run(
    workflows: &[PathBuf],
    event: &str,
    data: &str,
    state_dir: Option<&Path>,
    max_steps: usize,
) -> Result<Vec<Execution>> {
    let data: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
    if !data.is_object() {
        bail!("--data must be a JSON object");
    }

    let mut builder = WorkflowEngine::builder()
        .capabilities(cli_capabilities())
        .config(EngineConfig {
            max_steps_per_execution: max_steps,
            ..EngineConfig::default()
        });
    if let Some(dir) = state_dir {
        let store = JsonFileStore::open(dir)
            .await
            .with_context(|| format!("cannot open state directory {}", dir.display()))?;
        builder = builder.persistence(Arc::new(store));
    }
    let engine = builder.build();

    if state_dir.is_some() {
        engine.restore().await?;
    }
    for path in workflows {
        load_workflow_file(&engine, path).await?;
    }

    let executions = engine.dispatch_event(event, data).await?;
    if executions.is_empty() {
        info!(%event, "no workflow matched the event");
    }
    Ok(executions)
}

/// Register a workflow file, or update the stored workflow of the same name.
async fn load_workflow_file(engine: &WorkflowEngine, path: &Path) -> Result<()> {
    let definition = read_definition(path)?;
    let existing = engine
        .list_workflows()
        .await
        .into_iter()
        .find(|w| w.name == definition.name);

    let workflow = match existing {
        Some(stored) => engine
            .update_workflow(stored.id, definition)
            .await
            .with_context(|| format!("cannot update workflow from {}", path.display()))?,
        None => engine
            .register_workflow(definition)
            .await
            .with_context(|| format!("cannot register {}", path.display()))?,
    };
    info!(workflow_id = %workflow.id, path = %path.display(), "loaded workflow file");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => validate(&path),
        Command::Run {
            workflows,
            event,
            data,
            state_dir,
            max_steps,
        } => {
            let executions = run(&workflows, &event, &data, state_dir.as_deref(), max_steps).await?;
            println!("{}", serde_json::to_string_pretty(&executions)?);
            Ok(())
        }
    }
}
