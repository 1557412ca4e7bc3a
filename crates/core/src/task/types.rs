//! Batch task data types and the task state machine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::worker::Stage;

// ============================================================================
// Submission
// ============================================================================

/// A batch submission: the items to process and where the results go.
///
/// Deserialized straight from the submit endpoint body and retained on the
/// task for the workers and for audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Upstream identifiers of the items to process.
    #[serde(default)]
    pub item_ids: Vec<String>,
    /// Add every uploaded track to a destination collection.
    #[serde(default)]
    pub save_to_collection: bool,
    /// Destination collection, mandatory when `save_to_collection` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i64>,
    /// Per-item display name overrides, keyed by item id.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub name_override: HashMap<String, String>,
}

/// Rejections raised before a task is created.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("item list is empty")]
    EmptyBatch,

    #[error("item id at position {index} is blank")]
    BlankItemId { index: usize },

    #[error("collection id is required when saving to a collection")]
    MissingCollectionId,
}

impl BatchRequest {
    /// Creates a request for the given items with no destination options.
    pub fn new<I, S>(item_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            item_ids: item_ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Adds every uploaded track to the given collection.
    pub fn with_collection(mut self, collection_id: i64) -> Self {
        self.save_to_collection = true;
        self.collection_id = Some(collection_id);
        self
    }

    /// Sets a display name override for one item.
    pub fn with_name_override(
        mut self,
        item_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.name_override.insert(item_id.into(), name.into());
        self
    }

    /// Checks the submission before any task is created.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.item_ids.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }

        if let Some(index) = self.item_ids.iter().position(|id| id.trim().is_empty()) {
            return Err(ValidationError::BlankItemId { index });
        }

        if self.save_to_collection && self.collection_id.unwrap_or(0) == 0 {
            return Err(ValidationError::MissingCollectionId);
        }

        Ok(())
    }

    /// The override for an item, trimmed. Blank overrides count as absent.
    pub fn name_override_for(&self, item_id: &str) -> Option<&str> {
        self.name_override
            .get(item_id)
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
    }
}

// ============================================================================
// Task record
// ============================================================================

/// Lifecycle of a batch task.
///
/// `Pending -> Running -> {Completed, Failed, TimedOut}`. Terminal states
/// never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl TaskStatus {
    /// All states, in lifecycle order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::TimedOut,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::TimedOut
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::TimedOut)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item that failed one of its pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub item_id: String,
    /// Best-known display name when the failure happened.
    pub title: String,
    pub stage: Stage,
    pub error: String,
}

/// Errors raised by task mutations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task {task_id} is {status}; outcomes are frozen")]
    Frozen { task_id: String, status: TaskStatus },

    #[error("task {task_id} already holds all {total} outcomes")]
    OutcomeOverflow { task_id: String, total: usize },
}

/// The aggregate record for one batch submission.
///
/// Fields are read-only outside this module; every mutation goes through the
/// methods below so `progress` and `updated_at` never drift from the lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTask {
    #[serde(rename = "taskId")]
    id: String,
    status: TaskStatus,
    total: usize,
    progress: u8,
    succeeded: Vec<String>,
    failed: Vec<FailedItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    request: BatchRequest,
}

impl BatchTask {
    pub(crate) fn new(id: String, request: BatchRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Pending,
            total: request.item_ids.len(),
            progress: 0,
            succeeded: Vec::new(),
            failed: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            request,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn succeeded(&self) -> &[String] {
        &self.succeeded
    }

    pub fn failed(&self) -> &[FailedItem] {
        &self.failed
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn request(&self) -> &BatchRequest {
        &self.request
    }

    /// Number of outcomes recorded so far.
    pub fn reported(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn transition(
        &mut self,
        next: TaskStatus,
        error: Option<String>,
    ) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        self.status = next;
        if next == TaskStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        if next == TaskStatus::Completed {
            self.progress = 100;
        }
        if error.is_some() {
            self.error = error;
        }
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn add_success(&mut self, label: String) -> Result<(), TaskError> {
        self.check_accepts_outcome()?;
        self.succeeded.push(label);
        self.touch_progress();
        Ok(())
    }

    pub(crate) fn add_failed(&mut self, item: FailedItem) -> Result<(), TaskError> {
        self.check_accepts_outcome()?;
        self.failed.push(item);
        self.touch_progress();
        Ok(())
    }

    fn check_accepts_outcome(&self) -> Result<(), TaskError> {
        if self.status != TaskStatus::Running {
            return Err(TaskError::Frozen {
                task_id: self.id.clone(),
                status: self.status,
            });
        }
        if self.reported() >= self.total {
            return Err(TaskError::OutcomeOverflow {
                task_id: self.id.clone(),
                total: self.total,
            });
        }
        Ok(())
    }

    fn touch_progress(&mut self) {
        let computed = if self.total == 0 {
            100
        } else {
            (self.reported() * 100 / self.total) as u8
        };
        // Integer division can only grow with the count, but keep the
        // invariant explicit.
        self.progress = self.progress.max(computed);
        self.updated_at = Utc::now();
    }
}
