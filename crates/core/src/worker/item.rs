use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::scratch::{sanitize_filename, ScratchDir};
use super::types::{ItemJob, ItemOutcome, Stage, StageError, StageTimeouts};
use crate::converter::{Converter, TrackTags, TranscodeJob};
use crate::fetcher::MediaFetcher;
use crate::gate::{ConcurrencyGate, GateError};
use crate::source::{ItemMetadata, MediaSource, StreamLocation};
use crate::uploader::Uploader;

/// The external services an item passes through.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn MediaSource>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub converter: Arc<dyn Converter>,
    pub uploader: Arc<dyn Uploader>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("source", &self.source.name())
            .field("fetcher", &self.fetcher.name())
            .field("converter", &self.converter.name())
            .field("uploader", &self.uploader.name())
            .finish()
    }
}

/// Runs one item through every stage.
///
/// Lookups run ungated. The gate slot is taken right before the download
/// and held until the upload returns.
#[derive(Debug, Clone)]
pub struct ItemWorker {
    collaborators: Collaborators,
    gate: ConcurrencyGate,
    scratch_root: PathBuf,
    timeouts: StageTimeouts,
}

/// Races a stage against cancellation and its time limit.
async fn run_stage<T, E, F>(
    stage: Stage,
    limit: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, StageError>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StageError::cancelled(stage)),
        res = tokio::time::timeout(limit, fut) => match res {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StageError::new(stage, e.to_string())),
            Err(_) => Err(StageError::timed_out(stage, limit)),
        },
    }
}

impl ItemWorker {
    pub fn new(
        collaborators: Collaborators,
        gate: ConcurrencyGate,
        scratch_root: PathBuf,
        timeouts: StageTimeouts,
    ) -> Self {
        Self {
            collaborators,
            gate,
            scratch_root,
            timeouts,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Processes one item. Never fails: every error becomes the outcome.
    pub async fn run(&self, job: ItemJob, cancel: &CancellationToken) -> ItemOutcome {
        let started = Instant::now();
        let mut label = job.item_id.clone();
        let result = self.run_stages(&job, cancel, &mut label).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(()) => info!(
                item_id = %job.item_id,
                title = %label,
                elapsed_ms = elapsed.as_millis() as u64,
                "Item processed"
            ),
            Err(e) => warn!(
                item_id = %job.item_id,
                stage = %e.stage,
                error = %e.message,
                "Item failed"
            ),
        }

        ItemOutcome {
            index: job.index,
            item_id: job.item_id,
            label,
            result,
            elapsed,
        }
    }

    async fn run_stages(
        &self,
        job: &ItemJob,
        cancel: &CancellationToken,
        label: &mut String,
    ) -> Result<(), StageError> {
        let source = &self.collaborators.source;
        let lookup = self.timeouts.lookup;

        let metadata = run_stage(
            Stage::Metadata,
            lookup,
            cancel,
            source.fetch_metadata(&job.item_id),
        )
        .await?;
        *label = match &job.name_override {
            Some(name) => name.clone(),
            None => metadata.title.clone(),
        };
        debug!(item_id = %job.item_id, title = %label, "Metadata fetched");

        let location = run_stage(
            Stage::Stream,
            lookup,
            cancel,
            source.resolve_stream(&metadata.stream_ref),
        )
        .await?;

        let permit = self.gate.acquire(cancel).await.map_err(|e| match e {
            GateError::Cancelled => StageError::cancelled(Stage::Gate),
            GateError::Closed => StageError::new(Stage::Gate, e.to_string()),
        })?;

        let scratch = ScratchDir::create(&self.scratch_root)
            .await
            .map_err(|e| StageError::new(Stage::Scratch, e.to_string()))?;

        let result = self
            .process_in(&scratch, job, &metadata, &location, label.as_str(), cancel)
            .await;

        scratch.cleanup().await;
        permit.release();
        result
    }

    /// The gated stages, all working inside `scratch`.
    async fn process_in(
        &self,
        scratch: &ScratchDir,
        job: &ItemJob,
        metadata: &ItemMetadata,
        location: &StreamLocation,
        title: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        let file_stem = sanitize_filename(title);
        let raw_path = scratch.file(&format!("{}.mp4", file_stem));
        let output_path = scratch.file(&format!("{}.mp3", file_stem));

        let bytes = run_stage(
            Stage::Download,
            self.timeouts.download,
            cancel,
            self.collaborators.fetcher.download(location, &raw_path),
        )
        .await?;
        debug!(item_id = %job.item_id, bytes, "Media downloaded");

        let cover_path = run_stage(
            Stage::Cover,
            self.timeouts.lookup,
            cancel,
            self.collaborators
                .source
                .fetch_author_image(&metadata.author_id, scratch.path()),
        )
        .await?;

        let transcode = TranscodeJob {
            input_path: raw_path,
            cover_path,
            output_path,
            tags: TrackTags::new(title, metadata.author_name.clone()),
        };
        let transcoded = run_stage(
            Stage::Transcode,
            self.timeouts.transcode,
            cancel,
            self.collaborators.converter.transcode(transcode, cancel),
        )
        .await?;

        let receipt = run_stage(
            Stage::Upload,
            self.timeouts.upload,
            cancel,
            self.collaborators
                .uploader
                .upload(&transcoded.output_path, &job.target),
        )
        .await?;
        debug!(item_id = %job.item_id, track_id = %receipt.track_id, "Upload accepted");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConverter, MockFetcher, MockMediaSource, MockUploader};
    use crate::uploader::UploadTarget;
    use tempfile::TempDir;

    struct Harness {
        source: Arc<MockMediaSource>,
        fetcher: Arc<MockFetcher>,
        converter: Arc<MockConverter>,
        uploader: Arc<MockUploader>,
        scratch: TempDir,
        worker: ItemWorker,
    }

    fn harness(capacity: usize, timeouts: StageTimeouts) -> Harness {
        let source = Arc::new(MockMediaSource::new());
        let fetcher = Arc::new(MockFetcher::new());
        let converter = Arc::new(MockConverter::new());
        let uploader = Arc::new(MockUploader::new());
        let scratch = TempDir::new().unwrap();
        let collaborators = Collaborators {
            source: source.clone(),
            fetcher: fetcher.clone(),
            converter: converter.clone(),
            uploader: uploader.clone(),
        };
        let worker = ItemWorker::new(
            collaborators,
            ConcurrencyGate::new(capacity),
            scratch.path().to_path_buf(),
            timeouts,
        );
        Harness {
            source,
            fetcher,
            converter,
            uploader,
            scratch,
            worker,
        }
    }

    fn job(item_id: &str) -> ItemJob {
        ItemJob {
            index: 0,
            item_id: item_id.to_string(),
            name_override: None,
            target: UploadTarget::default(),
        }
    }

    fn scratch_is_empty(dir: &TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_success_uses_upstream_title() {
        let h = harness(2, StageTimeouts::default());
        h.source.set_title("v1", "First Song").await;

        let outcome = h.worker.run(job("v1"), &CancellationToken::new()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.label, "First Song");
        assert_eq!(h.uploader.uploaded_files().await, vec!["First Song.mp3".to_string()]);
        assert!(scratch_is_empty(&h.scratch));
        assert_eq!(h.worker.gate().status().in_flight, 0);
    }

    #[tokio::test]
    async fn test_name_override_applied_and_sanitized() {
        let h = harness(1, StageTimeouts::default());
        let mut item = job("v1");
        item.name_override = Some("AC/DC: Live".to_string());

        let outcome = h.worker.run(item, &CancellationToken::new()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.label, "AC/DC: Live");
        let jobs = h.converter.jobs().await;
        assert_eq!(jobs[0].tags.title, "AC/DC: Live");
        assert!(jobs[0].output_path.ends_with("AC_DC_ Live.mp3"));
    }

    #[tokio::test]
    async fn test_metadata_failure_labels_with_item_id() {
        let h = harness(1, StageTimeouts::default());
        h.source.fail_metadata("v9", "item not found: v9").await;

        let outcome = h.worker.run(job("v9"), &CancellationToken::new()).await;

        let err = outcome.result.unwrap_err();
        assert_eq!(outcome.label, "v9");
        assert_eq!(err.stage, Stage::Metadata);
        assert_eq!(err.message, "item not found: v9");
        assert_eq!(h.fetcher.download_count().await, 0);
        assert_eq!(h.worker.gate().status().total_admitted, 0);
    }

    #[tokio::test]
    async fn test_stream_failure_labels_with_title() {
        let h = harness(1, StageTimeouts::default());
        h.source.set_title("v1", "Title One").await;
        h.source.fail_stream("v1", "no playable stream").await;

        let outcome = h.worker.run(job("v1"), &CancellationToken::new()).await;

        let err = outcome.result.unwrap_err();
        assert_eq!(outcome.label, "Title One");
        assert_eq!(err.stage, Stage::Stream);
        assert_eq!(err.message, "no playable stream");
        assert_eq!(h.worker.gate().status().total_admitted, 0);
        assert_eq!(h.fetcher.download_count().await, 0);
        assert!(scratch_is_empty(&h.scratch));
    }

    #[tokio::test]
    async fn test_cover_failure_reported_and_cleaned_up() {
        let h = harness(1, StageTimeouts::default());
        h.source.set_title("v2", "Title Two").await;
        h.source.fail_cover("v2", "avatar 404").await;

        let outcome = h.worker.run(job("v2"), &CancellationToken::new()).await;

        let err = outcome.result.unwrap_err();
        assert_eq!(outcome.label, "Title Two");
        assert_eq!(err.stage, Stage::Cover);
        assert_eq!(err.message, "avatar 404");
        assert_eq!(h.fetcher.download_count().await, 1);
        assert!(h.converter.jobs().await.is_empty());
        assert!(h.uploader.uploads().await.is_empty());
        assert!(scratch_is_empty(&h.scratch));
        assert_eq!(h.worker.gate().status().in_flight, 0);
    }

    #[tokio::test]
    async fn test_lookup_timeout_before_gate() {
        let h = harness(1, StageTimeouts::uniform(Duration::from_millis(50)));
        h.source.set_lookup_delay(Duration::from_secs(5)).await;

        let outcome = h.worker.run(job("v3"), &CancellationToken::new()).await;

        let err = outcome.result.unwrap_err();
        assert_eq!(outcome.label, "v3");
        assert_eq!(err.stage, Stage::Metadata);
        assert!(err.message.contains("timed out"));
        assert_eq!(h.worker.gate().status().total_admitted, 0);
    }

    #[tokio::test]
    async fn test_download_failure_keeps_message_and_cleans_up() {
        let h = harness(1, StageTimeouts::default());
        h.source.set_title("v2", "Second").await;
        h.fetcher.fail_item("v2", "network timeout").await;

        let outcome = h.worker.run(job("v2"), &CancellationToken::new()).await;

        let err = outcome.result.unwrap_err();
        assert_eq!(outcome.label, "Second");
        assert_eq!(err.stage, Stage::Download);
        assert_eq!(err.message, "network timeout");
        assert!(h.converter.jobs().await.is_empty());
        assert!(scratch_is_empty(&h.scratch));
        assert_eq!(h.worker.gate().status().in_flight, 0);
    }

    #[tokio::test]
    async fn test_upload_rejection_reported() {
        let h = harness(1, StageTimeouts::default());
        h.uploader.fail_item("v1", "track already exists").await;

        let outcome = h.worker.run(job("v1"), &CancellationToken::new()).await;

        let err = outcome.result.unwrap_err();
        assert_eq!(err.stage, Stage::Upload);
        assert_eq!(err.message, "track already exists");
        assert!(scratch_is_empty(&h.scratch));
    }

    #[tokio::test]
    async fn test_stage_timeout() {
        let h = harness(1, StageTimeouts::uniform(Duration::from_millis(50)));
        h.fetcher.set_delay(Duration::from_secs(5)).await;

        let outcome = h.worker.run(job("v1"), &CancellationToken::new()).await;

        let err = outcome.result.unwrap_err();
        assert_eq!(err.stage, Stage::Download);
        assert!(err.message.contains("timed out"));
        assert!(scratch_is_empty(&h.scratch));
    }

    #[tokio::test]
    async fn test_cancel_during_download() {
        let h = harness(1, StageTimeouts::default());
        h.fetcher.set_delay(Duration::from_secs(5)).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = h.worker.run(job("v1"), &cancel).await;

        let err = outcome.result.unwrap_err();
        assert_eq!(err.stage, Stage::Cancelled);
        assert_eq!(err.message, "cancelled during download");
        assert_eq!(h.worker.gate().status().in_flight, 0);
        assert!(scratch_is_empty(&h.scratch));
    }

    #[tokio::test]
    async fn test_cancelled_before_gate() {
        let h = harness(1, StageTimeouts::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = h.worker.run(job("v1"), &cancel).await;
        assert_eq!(outcome.result.unwrap_err().stage, Stage::Cancelled);
        assert_eq!(h.fetcher.download_count().await, 0);
    }
}
