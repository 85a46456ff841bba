//! A [`PersistenceHook`] that keeps one JSON file per workflow and per
//! execution under a state directory:
//!
//! ```text
//! <state-dir>/workflows/<id>.json
//! <state-dir>/executions/<id>.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use engine::{Execution, PersistenceError, PersistenceHook, Workflow};
use serde::Serialize;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        fs::create_dir_all(root.join("workflows")).await?;
        fs::create_dir_all(root.join("executions")).await?;
        Ok(Self { root })
    }

    fn workflow_path(&self, id: Uuid) -> PathBuf {
        self.root.join("workflows").join(format!("{id}.json"))
    }

    fn execution_path(&self, id: Uuid) -> PathBuf {
        self.root.join("executions").join(format!("{id}.json"))
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl PersistenceHook for JsonFileStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), PersistenceError> {
        write_json(&self.workflow_path(workflow.id), workflow).await
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<(), PersistenceError> {
        match fs::remove_file(self.workflow_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_execution(&self, execution: &Execution) -> Result<(), PersistenceError> {
        write_json(&self.execution_path(execution.id), execution).await
    }

    async fn load_workflows(&self) -> Result<Vec<Workflow>, PersistenceError> {
        let mut workflows = Vec::new();
        let mut entries = fs::read_dir(self.root.join("workflows")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            workflows.push(serde_json::from_slice(&bytes)?);
            debug!(path = %path.display(), "loaded persisted workflow");
        }
        Ok(workflows)
    }
}
