//! Mock uploader for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::probe::ConcurrencyProbe;
use crate::uploader::{UploadError, UploadReceipt, UploadTarget, Uploader};

/// A recorded upload for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub file_name: String,
    pub target: UploadTarget,
}

/// Mock implementation of the Uploader trait.
///
/// Failures are keyed by the uploaded file's stem.
#[derive(Debug, Default)]
pub struct MockUploader {
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    failures: Arc<RwLock<HashMap<String, String>>>,
    delay: Arc<RwLock<Duration>>,
    probe: ConcurrencyProbe,
}

impl MockUploader {
    /// Create a new mock uploader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the upload of `stem.mp3` fail with `message`.
    pub async fn fail_item(&self, stem: &str, message: &str) {
        self.failures
            .write()
            .await
            .insert(stem.to_string(), message.to_string());
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Successful uploads, in completion order.
    pub async fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }

    /// File names of successful uploads.
    pub async fn uploaded_files(&self) -> Vec<String> {
        self.uploads
            .read()
            .await
            .iter()
            .map(|u| u.file_name.clone())
            .collect()
    }

    /// Concurrency observed inside `upload`.
    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }
}

#[async_trait]
impl Uploader for MockUploader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn upload(
        &self,
        path: &Path,
        target: &UploadTarget,
    ) -> Result<UploadReceipt, UploadError> {
        let _inside = self.probe.enter();

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let data = tokio::fs::read(path).await?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(message) = self.failures.read().await.get(&stem) {
            return Err(UploadError::Transport(message.clone()));
        }

        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut uploads = self.uploads.write().await;
        uploads.push(RecordedUpload {
            file_name,
            target: *target,
        });

        Ok(UploadReceipt {
            track_id: format!("track-{}", uploads.len()),
            md5: format!("{:x}", md5::compute(&data)),
            transferred: true,
            collection_id: target.collection(),
        })
    }
}
