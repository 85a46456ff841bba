//! Latest snapshot of recent executions, plus cancellation handles for the
//! ones still in flight.
//!
//! Snapshots are copies published by the task that owns the execution; the
//! history never mutates an execution itself. Unfinished executions are
//! always kept. Finished ones are kept up to a retention limit and evicted
//! oldest-finished first; durable history belongs to the persistence hook.

use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::models::Execution;

/// Finished snapshots kept by [`ExecutionHistory::new`].
pub const DEFAULT_RETAINED_EXECUTIONS: usize = 10_000;

#[derive(Debug, Default)]
struct Snapshots {
    by_id: HashMap<Uuid, Execution>,
    /// Terminal executions in the order they finished.
    finished: VecDeque<Uuid>,
}

#[derive(Debug)]
pub struct ExecutionHistory {
    snapshots: RwLock<Snapshots>,
    in_flight: RwLock<HashMap<Uuid, CancellationToken>>,
    max_retained: usize,
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAINED_EXECUTIONS)
    }

    /// Keep at most `max_retained` finished executions.
    pub fn with_retention(max_retained: usize) -> Self {
        Self {
            snapshots: RwLock::new(Snapshots::default()),
            in_flight: RwLock::new(HashMap::new()),
            max_retained,
        }
    }

    pub(crate) async fn admit(&self, id: Uuid, cancel: CancellationToken) {
        self.in_flight.write().await.insert(id, cancel);
    }

    pub(crate) async fn publish(&self, execution: &Execution) {
        let mut snapshots = self.snapshots.write().await;
        let newly_finished = execution.is_terminal()
            && !snapshots
                .by_id
                .get(&execution.id)
                .is_some_and(Execution::is_terminal);

        snapshots.by_id.insert(execution.id, execution.clone());
        if !newly_finished {
            return;
        }

        snapshots.finished.push_back(execution.id);
        while snapshots.finished.len() > self.max_retained {
            if let Some(evicted) = snapshots.finished.pop_front() {
                snapshots.by_id.remove(&evicted);
                debug!(execution_id = %evicted, "evicted finished execution from history");
            }
        }
    }

    pub(crate) async fn retire(&self, id: Uuid) {
        self.in_flight.write().await.remove(&id);
    }

    /// Signal cancellation; `false` if the execution is unknown or finished.
    pub async fn cancel(&self, id: Uuid) -> bool {
        match self.in_flight.read().await.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<Execution> {
        self.snapshots.read().await.by_id.get(&id).cloned()
    }

    /// Snapshots, newest first, optionally restricted to one workflow.
    pub async fn list(&self, workflow_id: Option<Uuid>) -> Vec<Execution> {
        let mut all: Vec<Execution> = self
            .snapshots
            .read()
            .await
            .by_id
            .values()
            .filter(|e| workflow_id.map_or(true, |id| e.workflow_id == id))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Drop every finished snapshot. Returns how many were removed.
    pub async fn clear_finished(&self) -> usize {
        let mut snapshots = self.snapshots.write().await;
        let finished = std::mem::take(&mut snapshots.finished);
        for id in &finished {
            snapshots.by_id.remove(id);
        }
        finished.len()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.by_id.is_empty()
    }

    pub async fn in_flight(&self) -> usize {
        self.in_flight.read().await.len()
    }
}
