//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! backed by a real orchestrator with mock collaborators injected, so whole
//! batches run without an upstream API, ffmpeg or a destination service.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vidtune_core::testing::MockSet;
use vidtune_core::BatchOrchestrator;
use vidtune_server::state::AppState;

/// Re-export fixtures for test convenience
pub use vidtune_core::testing::fixtures;

/// Test fixture for API testing with mock collaborators.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/batches", json!({
///         "itemIds": ["v1", "v2"]
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock collaborators - configure titles, failures and delays
    pub mocks: MockSet,
    /// The orchestrator behind the router
    pub orchestrator: BatchOrchestrator,
    /// Scratch root for item working directories
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with a gate of three slots.
    pub fn new() -> Self {
        Self::with_concurrency(3)
    }

    pub fn with_concurrency(max_concurrency: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mocks = MockSet::new();

        let mut config = fixtures::config(temp_dir.path(), max_concurrency);
        config.server.host = std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        config.source.cookie = Some("SESSDATA=secret".to_string());

        let orchestrator = BatchOrchestrator::from_config(&config, mocks.collaborators());
        let state = Arc::new(AppState::new(config, orchestrator.clone()));
        let router = vidtune_server::api::create_router(state);

        Self {
            router,
            mocks,
            orchestrator,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a GET request and return the raw text body.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Submit a batch and return its task id.
    pub async fn submit(&self, body: Value) -> String {
        let response = self.post("/api/v1/batches", body).await;
        assert_eq!(response.status, StatusCode::ACCEPTED, "body: {}", response.body);
        response.body["taskId"]
            .as_str()
            .expect("taskId should be a string")
            .to_string()
    }

    /// Wait until the task is terminal without consuming it.
    pub async fn wait_terminal(&self, task_id: &str) {
        for _ in 0..500 {
            let task = self
                .orchestrator
                .status(task_id)
                .await
                .expect("task should exist");
            if task.is_terminal() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} did not finish in time");
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
