//! Mock converter for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::probe::ConcurrencyProbe;
use crate::converter::{Converter, ConverterError, TranscodeJob, TranscodeResult};

/// Mock implementation of the Converter trait.
///
/// Writes a placeholder MP3 at the job's output path. Failures are keyed by
/// the output file stem, which is the sanitized display title.
#[derive(Debug, Default)]
pub struct MockConverter {
    jobs: Arc<RwLock<Vec<TranscodeJob>>>,
    failures: Arc<RwLock<HashMap<String, String>>>,
    /// If set, the next transcode fails with this error.
    next_error: Arc<RwLock<Option<ConverterError>>>,
    delay: Arc<RwLock<Duration>>,
    probe: ConcurrencyProbe,
}

impl MockConverter {
    /// Create a new mock converter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the transcode of `stem.mp3` fail with `message`.
    pub async fn fail_item(&self, stem: &str, message: &str) {
        self.failures
            .write()
            .await
            .insert(stem.to_string(), message.to_string());
    }

    /// Configure the next transcode to fail with the given error.
    pub async fn set_next_error(&self, error: ConverterError) {
        *self.next_error.write().await = Some(error);
    }

    /// Simulated transcode duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Jobs received, in call order.
    pub async fn jobs(&self) -> Vec<TranscodeJob> {
        self.jobs.read().await.clone()
    }

    /// Concurrency observed inside `transcode`.
    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transcode(
        &self,
        job: TranscodeJob,
        cancel: &CancellationToken,
    ) -> Result<TranscodeResult, ConverterError> {
        let _inside = self.probe.enter();
        self.jobs.write().await.push(job.clone());

        if tokio::fs::metadata(&job.cover_path).await.is_err() {
            return Err(ConverterError::CoverArtMissing {
                path: job.cover_path.clone(),
            });
        }

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ConverterError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        let stem = job
            .output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(message) = self.failures.read().await.get(&stem) {
            return Err(ConverterError::conversion_failed(
                "transcode",
                message.clone(),
                None,
            ));
        }

        tokio::fs::write(&job.output_path, b"ID3 mock mp3").await?;
        Ok(TranscodeResult {
            output_path: job.output_path,
            output_size_bytes: 12,
            duration_ms: delay.as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        Ok(())
    }
}
