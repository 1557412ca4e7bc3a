//! Mock media fetcher for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::probe::ConcurrencyProbe;
use crate::fetcher::{FetchError, MediaFetcher};
use crate::source::StreamLocation;

/// Mock implementation of the MediaFetcher trait.
///
/// The item id is taken from the last path segment of the stream URL.
/// Downloads write a small placeholder file.
#[derive(Debug, Default)]
pub struct MockFetcher {
    failures: Arc<RwLock<HashMap<String, String>>>,
    /// If set, the next download fails with this error.
    next_error: Arc<RwLock<Option<FetchError>>>,
    downloads: Arc<RwLock<Vec<String>>>,
    delay: Arc<RwLock<Duration>>,
    item_delays: Arc<RwLock<HashMap<String, Duration>>>,
    probe: ConcurrencyProbe,
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make downloads for an item fail with `message`.
    pub async fn fail_item(&self, item_id: &str, message: &str) {
        self.failures
            .write()
            .await
            .insert(item_id.to_string(), message.to_string());
    }

    /// Configure the next download to fail with the given error.
    pub async fn set_next_error(&self, error: FetchError) {
        *self.next_error.write().await = Some(error);
    }

    /// Simulated transfer time per download.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Simulated transfer time for one item, overriding the global delay.
    pub async fn delay_item(&self, item_id: &str, delay: Duration) {
        self.item_delays
            .write()
            .await
            .insert(item_id.to_string(), delay);
    }

    /// Item ids downloaded (or attempted), in call order.
    pub async fn downloads(&self) -> Vec<String> {
        self.downloads.read().await.clone()
    }

    pub async fn download_count(&self) -> usize {
        self.downloads.read().await.len()
    }

    /// Concurrency observed inside `download`.
    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn download(&self, location: &StreamLocation, dest: &Path) -> Result<u64, FetchError> {
        let _inside = self.probe.enter();
        let item_id = location
            .url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        self.downloads.write().await.push(item_id.clone());

        let delay = match self.item_delays.read().await.get(&item_id) {
            Some(delay) => *delay,
            None => *self.delay.read().await,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        if let Some(message) = self.failures.read().await.get(&item_id) {
            return Err(FetchError::Transport(message.clone()));
        }

        let body = format!("media for {}", item_id);
        tokio::fs::write(dest, body.as_bytes()).await?;
        Ok(body.len() as u64)
    }
}
