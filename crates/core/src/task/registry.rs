//! In-memory task registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{BatchRequest, BatchTask, FailedItem, TaskError, TaskStatus};

/// Error message stored on tasks that exceed the batch timeout.
pub const TIMED_OUT_MESSAGE: &str = "task timed out";

/// What a single reaper pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tasks moved from Running to TimedOut.
    pub timed_out: Vec<String>,
    /// Terminal tasks dropped after the retention window.
    pub evicted: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.timed_out.is_empty() && self.evicted.is_empty()
    }
}

/// Owns every batch task, keyed by id.
///
/// The map lock and the per-task locks are independent: no operation waits
/// on a task lock while holding the map lock. Removals re-check the entry by
/// pointer under the map write lock. Accessors hand out cloned snapshots.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<RwLock<BatchTask>>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new Pending task and returns its snapshot.
    pub async fn create(&self, request: BatchRequest) -> BatchTask {
        let mut tasks = self.tasks.write().await;
        let mut id = Uuid::new_v4().to_string();
        while tasks.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }

        let task = BatchTask::new(id.clone(), request);
        let snapshot = task.clone();
        tasks.insert(id, Arc::new(RwLock::new(task)));

        debug!(task_id = %snapshot.id(), total = snapshot.total(), "Task registered");
        snapshot
    }

    pub async fn get(&self, id: &str) -> Option<BatchTask> {
        let handle = self.handle(id).await?;
        let task = handle.read().await;
        Some(task.clone())
    }

    /// Moves a task through the state machine.
    pub async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<BatchTask, TaskError> {
        self.mutate(id, |task| task.transition(status, error)).await
    }

    /// Records one successful item and recomputes progress.
    pub async fn add_success(&self, id: &str, label: String) -> Result<BatchTask, TaskError> {
        self.mutate(id, |task| task.add_success(label)).await
    }

    /// Records one failed item and recomputes progress.
    pub async fn add_failed(&self, id: &str, item: FailedItem) -> Result<BatchTask, TaskError> {
        self.mutate(id, |task| task.add_failed(item)).await
    }

    /// Returns the task snapshot, removing the record when it is terminal.
    ///
    /// Terminal states never change, so the snapshot is taken without the
    /// map lock. Only the caller whose removal succeeds gets it; a racing
    /// caller sees NotFound, so a terminal snapshot is handed out at most once.
    pub async fn take_if_terminal(&self, id: &str) -> Result<BatchTask, TaskError> {
        let handle = self
            .handle(id)
            .await
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;

        let snapshot = handle.read().await.clone();
        if !snapshot.is_terminal() {
            return Ok(snapshot);
        }

        if !self.remove_if_same(id, &handle).await {
            return Err(TaskError::NotFound(id.to_string()));
        }
        debug!(task_id = %id, status = %snapshot.status(), "Terminal task consumed");
        Ok(snapshot)
    }

    pub async fn list(&self) -> Vec<BatchTask> {
        let handles: Vec<_> = self.tasks.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            snapshots.push(handle.read().await.clone());
        }
        snapshots.sort_by_key(|t| t.created_at());
        snapshots
    }

    pub async fn count_by_status(&self) -> HashMap<TaskStatus, usize> {
        let mut counts: HashMap<TaskStatus, usize> =
            TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for task in self.list().await {
            *counts.entry(task.status()).or_default() += 1;
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Times out Running tasks older than `timeout` and evicts terminal
    /// tasks untouched for longer than `retention`.
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
        retention: Duration,
    ) -> SweepReport {
        let timeout = to_chrono(timeout);
        let retention = to_chrono(retention);
        let mut report = SweepReport::default();

        let handles: Vec<_> = self
            .tasks
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();

        for (id, handle) in handles {
            let mut task = handle.write().await;
            let overdue = task.status() == TaskStatus::Running
                && task
                    .started_at()
                    .is_some_and(|started| now - started > timeout);
            if overdue
                && task
                    .transition(TaskStatus::TimedOut, Some(TIMED_OUT_MESSAGE.to_string()))
                    .is_ok()
            {
                info!(task_id = %id, reported = task.reported(), total = task.total(), "Task timed out");
                report.timed_out.push(id);
            }
        }

        let handles: Vec<_> = self
            .tasks
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();

        for (id, handle) in handles {
            let expired = {
                let task = handle.read().await;
                task.is_terminal() && now - task.updated_at() > retention
            };
            if expired && self.remove_if_same(&id, &handle).await {
                debug!(task_id = %id, "Evicted unpolled terminal task");
                report.evicted.push(id);
            }
        }

        report
    }

    async fn handle(&self, id: &str) -> Option<Arc<RwLock<BatchTask>>> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Removes `id` only if it still maps to `handle`.
    async fn remove_if_same(&self, id: &str, handle: &Arc<RwLock<BatchTask>>) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.get(id) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                tasks.remove(id);
                true
            }
            _ => false,
        }
    }

    async fn mutate<F>(&self, id: &str, f: F) -> Result<BatchTask, TaskError>
    where
        F: FnOnce(&mut BatchTask) -> Result<(), TaskError>,
    {
        let handle = self
            .handle(id)
            .await
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        let mut task = handle.write().await;
        f(&mut task)?;
        Ok(task.clone())
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}
