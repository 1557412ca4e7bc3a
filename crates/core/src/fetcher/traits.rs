use async_trait::async_trait;
use std::path::Path;

use super::error::FetchError;
use crate::source::StreamLocation;

/// Downloads a resolved stream to a local file.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Returns the name of this fetcher implementation.
    fn name(&self) -> &str;

    /// Writes the stream to `dest` and returns the byte count. A failed
    /// download leaves no file behind.
    async fn download(&self, location: &StreamLocation, dest: &Path) -> Result<u64, FetchError>;
}
