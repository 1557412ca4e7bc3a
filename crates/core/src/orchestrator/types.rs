//! Types for the batch orchestrator.

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::gate::GateStatus;
use crate::task::{TaskError, TaskStatus, ValidationError};

/// Errors returned to callers of the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The submission was rejected; no task exists.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("task not found: {0}")]
    NotFound(String),

    /// New batches are refused once shutdown started.
    #[error("orchestrator is shutting down")]
    ShuttingDown,

    #[error("task registry error: {0}")]
    Task(TaskError),
}

impl From<TaskError> for OrchestratorError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound(id) => OrchestratorError::NotFound(id),
            other => OrchestratorError::Task(other),
        }
    }
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub shutting_down: bool,
    /// Batches whose run loop has not finished yet.
    pub active_batches: usize,
    pub gate: GateStatus,
    pub tasks: HashMap<TaskStatus, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_is_verbatim() {
        let err = OrchestratorError::from(ValidationError::EmptyBatch);
        assert_eq!(err.to_string(), "item list is empty");
    }

    #[test]
    fn test_task_not_found_maps_to_not_found() {
        let err = OrchestratorError::from(TaskError::NotFound("t-1".to_string()));
        assert!(matches!(err, OrchestratorError::NotFound(ref id) if id == "t-1"));
        assert_eq!(err.to_string(), "task not found: t-1");
    }

    #[test]
    fn test_status_serializes_task_counts() {
        let status = OrchestratorStatus {
            shutting_down: false,
            active_batches: 1,
            gate: GateStatus {
                capacity: 3,
                in_flight: 1,
                waiting: 0,
                total_admitted: 4,
            },
            tasks: HashMap::from([(TaskStatus::Running, 1)]),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["tasks"]["running"], 1);
        assert_eq!(json["gate"]["capacity"], 3);
    }
}
