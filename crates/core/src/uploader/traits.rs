use async_trait::async_trait;
use std::path::Path;

use super::error::UploadError;
use super::types::{UploadReceipt, UploadTarget};

/// Pushes a finished audio file to the destination library.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Returns the name of this uploader implementation.
    fn name(&self) -> &str;

    async fn upload(&self, path: &Path, target: &UploadTarget)
        -> Result<UploadReceipt, UploadError>;
}
