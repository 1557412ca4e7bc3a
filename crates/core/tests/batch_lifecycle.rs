//! Batch lifecycle integration tests.
//!
//! These tests drive whole batches through the orchestrator with mock
//! collaborators: pending -> running -> completed / failed / timed_out

use std::collections::HashSet;
use std::time::Duration;

use tempfile::TempDir;

use vidtune_core::{
    testing::{fixtures, MockSet},
    BatchOrchestrator, BatchRequest, BatchTask, OrchestratorError, Stage, TaskStatus,
};

/// Test helper owning the mocks and the scratch directory.
struct TestHarness {
    mocks: MockSet,
    scratch: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            mocks: MockSet::new(),
            scratch: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn orchestrator(&self, max_concurrency: usize) -> BatchOrchestrator {
        let config = fixtures::config(self.scratch.path(), max_concurrency);
        BatchOrchestrator::from_config(&config, self.mocks.collaborators())
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}

/// Wait for a task to reach the given status, with timeout.
async fn wait_for_status(
    orch: &BatchOrchestrator,
    task_id: &str,
    expected: TaskStatus,
    timeout: Duration,
) -> BatchTask {
    let start = std::time::Instant::now();
    loop {
        let task = orch.status(task_id).await.expect("task should exist");
        if task.status() == expected {
            return task;
        }
        if start.elapsed() > timeout {
            panic!(
                "Timeout waiting for {}, task is {}",
                expected,
                task.status()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_idle(orch: &BatchOrchestrator) {
    for _ in 0..500 {
        if orch.status_summary().await.active_batches == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("orchestrator still has active batches");
}

#[tokio::test]
async fn test_partial_failure_still_completes() {
    let harness = TestHarness::new();
    harness.mocks.source.set_title("v1", "title1").await;
    harness.mocks.source.set_title("v3", "title3").await;
    harness.mocks.fetcher.fail_item("v2", "network timeout").await;
    let orch = harness.orchestrator(2);

    let task_id = orch
        .submit(BatchRequest::new(["v1", "v2", "v3"]))
        .await
        .unwrap();
    wait_for_status(&orch, &task_id, TaskStatus::Completed, Duration::from_secs(5)).await;

    let task = orch.poll(&task_id).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.progress(), 100);
    assert_eq!(task.error(), None);

    let succeeded: HashSet<_> = task.succeeded().iter().cloned().collect();
    assert_eq!(
        succeeded,
        HashSet::from(["title1".to_string(), "title3".to_string()])
    );

    assert_eq!(task.failed().len(), 1);
    let failure = &task.failed()[0];
    assert_eq!(failure.item_id, "v2");
    assert_eq!(failure.title, "v2");
    assert_eq!(failure.stage, Stage::Download);
    assert_eq!(failure.error, "network timeout");

    // Consumed by the poll above.
    assert!(matches!(
        orch.poll(&task_id).await,
        Err(OrchestratorError::NotFound(_))
    ));
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn test_lookup_and_cover_failures_are_per_item() {
    let harness = TestHarness::new();
    harness.mocks.source.set_title("v1", "Title One").await;
    harness.mocks.source.set_title("v2", "Title Two").await;
    harness.mocks.source.fail_stream("v1", "no playable stream").await;
    harness.mocks.source.fail_cover("v2", "avatar 404").await;
    let orch = harness.orchestrator(2);

    let task_id = orch
        .submit(BatchRequest::new(["v1", "v2", "v3"]))
        .await
        .unwrap();
    wait_for_status(&orch, &task_id, TaskStatus::Completed, Duration::from_secs(5)).await;

    let task = orch.poll(&task_id).await.unwrap();
    assert_eq!(task.succeeded(), ["v3".to_string()]);

    let mut failed = task.failed().to_vec();
    failed.sort_by(|a, b| a.item_id.cmp(&b.item_id));
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0].item_id, "v1");
    assert_eq!(failed[0].title, "Title One");
    assert_eq!(failed[0].stage, Stage::Stream);
    assert_eq!(failed[0].error, "no playable stream");
    assert_eq!(failed[1].item_id, "v2");
    assert_eq!(failed[1].title, "Title Two");
    assert_eq!(failed[1].stage, Stage::Cover);
    assert_eq!(failed[1].error, "avatar 404");

    assert!(harness.scratch_is_empty());
    assert_eq!(orch.gate_status().in_flight, 0);
}

#[tokio::test]
async fn test_every_item_reports_exactly_once() {
    let harness = TestHarness::new();
    harness.mocks.fetcher.fail_item("v4", "connection reset").await;
    harness.mocks.converter.fail_item("v7", "exit status 1").await;
    harness.mocks.uploader.fail_item("v9", "quota exceeded").await;
    harness.mocks.source.fail_metadata("v12", "item not found: v12").await;
    let orch = harness.orchestrator(3);

    let task_id = orch.submit(fixtures::numbered_request(12)).await.unwrap();
    let task =
        wait_for_status(&orch, &task_id, TaskStatus::Completed, Duration::from_secs(5)).await;

    assert_eq!(task.total(), 12);
    assert_eq!(task.succeeded().len() + task.failed().len(), 12);
    assert_eq!(task.failed().len(), 4);
    assert_eq!(task.progress(), 100);

    let stages: HashSet<_> = task.failed().iter().map(|f| f.stage).collect();
    assert_eq!(
        stages,
        HashSet::from([Stage::Download, Stage::Transcode, Stage::Upload, Stage::Metadata])
    );
    let transcode = task
        .failed()
        .iter()
        .find(|f| f.item_id == "v7")
        .unwrap();
    assert_eq!(transcode.error, "transcode failed: exit status 1");
}

#[tokio::test]
async fn test_gate_bounds_concurrent_item_pipelines() {
    let harness = TestHarness::new();
    harness
        .mocks
        .fetcher
        .set_delay(Duration::from_millis(40))
        .await;
    harness
        .mocks
        .converter
        .set_delay(Duration::from_millis(20))
        .await;
    let orch = harness.orchestrator(3);

    let task_id = orch.submit(fixtures::numbered_request(15)).await.unwrap();

    let mut max_in_flight = 0;
    loop {
        let gate = orch.gate_status();
        max_in_flight = max_in_flight.max(gate.in_flight);
        let task = orch.status(&task_id).await.unwrap();
        if task.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(max_in_flight <= 3);
    assert_eq!(harness.mocks.fetcher.probe().max(), 3);
    assert!(harness.mocks.converter.probe().max() <= 3);
    assert!(harness.mocks.uploader.probe().max() <= 3);
    assert_eq!(harness.mocks.fetcher.probe().entries(), 15);
    assert_eq!(orch.gate_status().in_flight, 0);
    assert_eq!(orch.gate_status().total_admitted, 15);
}

#[tokio::test]
async fn test_progress_never_decreases() {
    let harness = TestHarness::new();
    harness
        .mocks
        .fetcher
        .set_delay(Duration::from_millis(15))
        .await;
    let orch = harness.orchestrator(2);

    let task_id = orch.submit(fixtures::numbered_request(10)).await.unwrap();

    let mut seen = Vec::new();
    loop {
        let task = orch.status(&task_id).await.unwrap();
        assert!(task.reported() <= task.total());
        seen.push(task.progress());
        if task.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {seen:?}");
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test]
async fn test_prerequisite_failure_fails_batch_without_workers() {
    let harness = TestHarness::new();
    harness.mocks.source.set_prepare_error("session expired").await;
    let orch = harness.orchestrator(2);

    let task_id = orch.submit(fixtures::numbered_request(3)).await.unwrap();
    wait_for_status(&orch, &task_id, TaskStatus::Failed, Duration::from_secs(5)).await;

    let task = orch.poll(&task_id).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(
        task.error(),
        Some("upstream client unavailable: session expired")
    );
    assert!(task.succeeded().is_empty());
    assert!(task.failed().is_empty());
    assert!(harness.mocks.source.metadata_calls().await.is_empty());
    assert_eq!(harness.mocks.fetcher.download_count().await, 0);
}

#[tokio::test]
async fn test_empty_batch_rejected_before_task_exists() {
    let harness = TestHarness::new();
    let orch = harness.orchestrator(2);

    let err = orch
        .submit(BatchRequest::new(Vec::<String>::new()))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "item list is empty");
    assert!(orch.registry().is_empty().await);
}

#[tokio::test]
async fn test_collection_requires_id() {
    let harness = TestHarness::new();
    let orch = harness.orchestrator(2);

    let mut request = fixtures::numbered_request(2);
    request.save_to_collection = true;
    let err = orch.submit(request).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Validation(_)));
    assert!(orch.registry().is_empty().await);
}

#[tokio::test]
async fn test_collection_target_reaches_uploader() {
    let harness = TestHarness::new();
    let orch = harness.orchestrator(2);

    let request = fixtures::numbered_request(2).with_collection(77);
    let task_id = orch.submit(request).await.unwrap();
    wait_for_status(&orch, &task_id, TaskStatus::Completed, Duration::from_secs(5)).await;

    let uploads = harness.mocks.uploader.uploads().await;
    assert_eq!(uploads.len(), 2);
    assert!(uploads
        .iter()
        .all(|u| u.target.collection() == Some(77)));
}

#[tokio::test]
async fn test_blank_name_override_keeps_upstream_title() {
    let harness = TestHarness::new();
    harness.mocks.source.set_title("v1", "Upstream Title").await;
    harness.mocks.source.set_title("v2", "Other Title").await;
    let orch = harness.orchestrator(2);

    let request = BatchRequest::new(["v1", "v2"])
        .with_name_override("v1", "   ")
        .with_name_override("v2", "  a/b:c*d  ");
    let task_id = orch.submit(request).await.unwrap();
    let task =
        wait_for_status(&orch, &task_id, TaskStatus::Completed, Duration::from_secs(5)).await;

    let succeeded: HashSet<_> = task.succeeded().iter().cloned().collect();
    assert_eq!(
        succeeded,
        HashSet::from(["Upstream Title".to_string(), "a/b:c*d".to_string()])
    );
    let files: HashSet<_> = harness
        .mocks
        .uploader
        .uploaded_files()
        .await
        .into_iter()
        .collect();
    assert_eq!(
        files,
        HashSet::from(["Upstream Title.mp3".to_string(), "a_b_c_d.mp3".to_string()])
    );
}

#[tokio::test]
async fn test_outcomes_follow_completion_order() {
    let harness = TestHarness::new();
    harness
        .mocks
        .fetcher
        .delay_item("v1", Duration::from_millis(300))
        .await;
    let orch = harness.orchestrator(2);

    let task_id = orch
        .submit(BatchRequest::new(["v1", "v2"]))
        .await
        .unwrap();
    let task =
        wait_for_status(&orch, &task_id, TaskStatus::Completed, Duration::from_secs(5)).await;

    assert_eq!(task.succeeded(), ["v2".to_string(), "v1".to_string()]);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let harness = TestHarness::new();
    let orch = harness.orchestrator(1);

    assert!(matches!(
        orch.status("no-such-task").await,
        Err(OrchestratorError::NotFound(_))
    ));
    assert!(matches!(
        orch.poll("no-such-task").await,
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_running_task_poll_does_not_consume() {
    let harness = TestHarness::new();
    harness
        .mocks
        .fetcher
        .set_delay(Duration::from_millis(200))
        .await;
    let orch = harness.orchestrator(1);

    let task_id = orch.submit(fixtures::numbered_request(2)).await.unwrap();
    wait_for_status(&orch, &task_id, TaskStatus::Running, Duration::from_secs(5)).await;

    let first = orch.poll(&task_id).await.unwrap();
    assert_eq!(first.status(), TaskStatus::Running);
    assert!(orch.status(&task_id).await.is_ok());

    wait_for_status(&orch, &task_id, TaskStatus::Completed, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_reaper_times_out_overdue_batch() {
    let harness = TestHarness::new();
    harness.mocks.fetcher.set_delay(Duration::from_secs(30)).await;
    let orch = harness.orchestrator(1);

    let task_id = orch.submit(fixtures::numbered_request(3)).await.unwrap();
    wait_for_status(&orch, &task_id, TaskStatus::Running, Duration::from_secs(5)).await;

    let report = orch
        .reap_at(chrono::Utc::now() + chrono::Duration::hours(2))
        .await;
    assert_eq!(report.timed_out, vec![task_id.clone()]);
    assert!(report.evicted.is_empty());

    // Cancelled items unwind promptly; the record stays TimedOut.
    wait_idle(&orch).await;
    let task = orch.poll(&task_id).await.unwrap();
    assert_eq!(task.status(), TaskStatus::TimedOut);
    assert_eq!(task.error(), Some("task timed out"));
    assert!(task.succeeded().is_empty());
    assert!(orch.poll(&task_id).await.is_err());
    assert_eq!(orch.gate_status().in_flight, 0);
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn test_reaper_evicts_unpolled_terminal_tasks() {
    let harness = TestHarness::new();
    let orch = harness.orchestrator(2);

    let task_id = orch.submit(fixtures::numbered_request(1)).await.unwrap();
    wait_for_status(&orch, &task_id, TaskStatus::Completed, Duration::from_secs(5)).await;

    let report = orch
        .reap_at(chrono::Utc::now() + chrono::Duration::days(2))
        .await;

    assert_eq!(report.evicted, vec![task_id.clone()]);
    assert!(matches!(
        orch.poll(&task_id).await,
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_shutdown_cancels_waiting_items() {
    let harness = TestHarness::new();
    harness.mocks.fetcher.set_delay(Duration::from_secs(30)).await;
    let orch = harness.orchestrator(1);

    let task_id = orch.submit(fixtures::numbered_request(3)).await.unwrap();
    wait_for_status(&orch, &task_id, TaskStatus::Running, Duration::from_secs(5)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    orch.shutdown();
    let task =
        wait_for_status(&orch, &task_id, TaskStatus::Completed, Duration::from_secs(5)).await;

    assert_eq!(task.failed().len(), 3);
    assert!(task
        .failed()
        .iter()
        .all(|f| matches!(f.stage, Stage::Cancelled | Stage::Gate)));
}
