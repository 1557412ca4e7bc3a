//! Batch API handlers.
//!
//! Polling follows the task state:
//!
//! | state       | status | body                                  |
//! |-------------|--------|---------------------------------------|
//! | pending     | 406    | `{status: "pending"}`                 |
//! | running     | 202    | snapshot                              |
//! | completed   | 200    | snapshot, record discarded            |
//! | failed      | 500    | `{status, error}`, record discarded   |
//! | timed_out   | 500    | `{status, error}`, record discarded   |
//! | unknown     | 404    | `{error}`                             |

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};
use vidtune_core::{BatchRequest, OrchestratorError, TaskStatus};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for an accepted batch
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBatchResponse {
    pub task_id: String,
}

/// Body for tasks that have no snapshot worth returning
#[derive(Debug, Serialize)]
pub struct TaskStateResponse {
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct BatchErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(BatchErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a batch; the work runs in the background.
pub async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchRequest>,
) -> Response {
    match state.orchestrator().submit(body).await {
        Ok(task_id) => (StatusCode::ACCEPTED, Json(SubmitBatchResponse { task_id })).into_response(),
        Err(e @ OrchestratorError::Validation(_)) => {
            debug!(error = %e, "Batch rejected");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ OrchestratorError::ShuttingDown) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Failed to submit batch");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Poll a batch. Terminal snapshots are handed out once.
pub async fn poll_batch(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Response {
    let task = match state.orchestrator().poll(&task_id).await {
        Ok(task) => task,
        Err(e @ OrchestratorError::NotFound(_)) => {
            return error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e) => {
            error!(task_id = %task_id, error = %e, "Failed to poll batch");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    match task.status() {
        TaskStatus::Pending => (
            StatusCode::NOT_ACCEPTABLE,
            Json(TaskStateResponse {
                status: TaskStatus::Pending,
                error: None,
            }),
        )
            .into_response(),
        TaskStatus::Running => (StatusCode::ACCEPTED, Json(task)).into_response(),
        TaskStatus::Completed => (StatusCode::OK, Json(task)).into_response(),
        status @ (TaskStatus::Failed | TaskStatus::TimedOut) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(TaskStateResponse {
                status,
                error: task.error().map(str::to_string),
            }),
        )
            .into_response(),
    }
}
