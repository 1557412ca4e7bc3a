//! Mock upstream source for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::source::{ItemMetadata, MediaSource, SourceError, StreamLocation};

/// Mock implementation of the MediaSource trait.
///
/// Every item exists by default: its title is the item id, its author is
/// `author-<id>` and its stream resolves to `mock://media/<id>`, which
/// [`MockFetcher`](super::MockFetcher) understands.
#[derive(Debug, Default)]
pub struct MockMediaSource {
    titles: Arc<RwLock<HashMap<String, String>>>,
    metadata_failures: Arc<RwLock<HashMap<String, String>>>,
    stream_failures: Arc<RwLock<HashMap<String, String>>>,
    cover_failures: Arc<RwLock<HashMap<String, String>>>,
    /// If set, `prepare` fails with this message.
    prepare_error: Arc<RwLock<Option<String>>>,
    prepare_calls: Arc<RwLock<usize>>,
    metadata_calls: Arc<RwLock<Vec<String>>>,
    lookup_delay: Arc<RwLock<Duration>>,
}

impl MockMediaSource {
    /// Create a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the upstream title for an item.
    pub async fn set_title(&self, item_id: &str, title: &str) {
        self.titles
            .write()
            .await
            .insert(item_id.to_string(), title.to_string());
    }

    /// Make metadata lookup fail for an item.
    pub async fn fail_metadata(&self, item_id: &str, message: &str) {
        self.metadata_failures
            .write()
            .await
            .insert(item_id.to_string(), message.to_string());
    }

    /// Make stream resolution fail for an item.
    pub async fn fail_stream(&self, item_id: &str, message: &str) {
        self.stream_failures
            .write()
            .await
            .insert(item_id.to_string(), message.to_string());
    }

    /// Make the author image download fail for an item.
    pub async fn fail_cover(&self, item_id: &str, message: &str) {
        self.cover_failures
            .write()
            .await
            .insert(item_id.to_string(), message.to_string());
    }

    /// Make the batch prerequisite check fail.
    pub async fn set_prepare_error(&self, message: &str) {
        *self.prepare_error.write().await = Some(message.to_string());
    }

    /// Delay every metadata and stream lookup.
    pub async fn set_lookup_delay(&self, delay: Duration) {
        *self.lookup_delay.write().await = delay;
    }

    pub async fn prepare_calls(&self) -> usize {
        *self.prepare_calls.read().await
    }

    /// Item ids whose metadata was requested, in call order.
    pub async fn metadata_calls(&self) -> Vec<String> {
        self.metadata_calls.read().await.clone()
    }

    async fn simulate_latency(&self) {
        let delay = *self.lookup_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl MediaSource for MockMediaSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn prepare(&self) -> Result<(), SourceError> {
        *self.prepare_calls.write().await += 1;
        match self.prepare_error.read().await.as_ref() {
            Some(message) => Err(SourceError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }

    async fn fetch_metadata(&self, item_id: &str) -> Result<ItemMetadata, SourceError> {
        self.metadata_calls.write().await.push(item_id.to_string());
        self.simulate_latency().await;

        if let Some(message) = self.metadata_failures.read().await.get(item_id) {
            return Err(SourceError::Transport(message.clone()));
        }

        let title = self
            .titles
            .read()
            .await
            .get(item_id)
            .cloned()
            .unwrap_or_else(|| item_id.to_string());

        Ok(ItemMetadata {
            item_id: item_id.to_string(),
            title,
            description: String::new(),
            author_id: format!("author-{}", item_id),
            author_name: format!("Author of {}", item_id),
            stream_ref: item_id.to_string(),
        })
    }

    async fn resolve_stream(&self, stream_ref: &str) -> Result<StreamLocation, SourceError> {
        self.simulate_latency().await;

        if let Some(message) = self.stream_failures.read().await.get(stream_ref) {
            return Err(SourceError::Transport(message.clone()));
        }

        Ok(StreamLocation::new(format!("mock://media/{}", stream_ref))
            .with_header("Referer", "mock://upstream/"))
    }

    async fn fetch_author_image(
        &self,
        author_id: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, SourceError> {
        let item_id = author_id.strip_prefix("author-").unwrap_or(author_id);
        if let Some(message) = self.cover_failures.read().await.get(item_id) {
            return Err(SourceError::Transport(message.clone()));
        }

        let dest = dest_dir.join("cover.jpg");
        tokio::fs::write(&dest, b"mock cover").await?;
        Ok(dest)
    }
}
