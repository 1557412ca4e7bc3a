use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::error::SourceError;
use super::types::{ItemMetadata, StreamLocation};

/// The upstream content API an item is read from.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Returns the name of this source implementation.
    fn name(&self) -> &str;

    /// Checks the shared session once per batch, before any item runs.
    async fn prepare(&self) -> Result<(), SourceError>;

    async fn fetch_metadata(&self, item_id: &str) -> Result<ItemMetadata, SourceError>;

    /// Turns a metadata stream handle into a downloadable location.
    async fn resolve_stream(&self, stream_ref: &str) -> Result<StreamLocation, SourceError>;

    /// Downloads the author's profile image into `dest_dir` and returns its path.
    async fn fetch_author_image(
        &self,
        author_id: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, SourceError>;
}
