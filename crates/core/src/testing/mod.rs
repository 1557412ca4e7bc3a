//! Mock collaborators for unit and integration tests.
//!
//! Every pipeline trait has a controllable in-memory implementation here, so
//! batches can be run end to end without an upstream API, ffmpeg or a
//! destination service.
//!
//! # Example
//!
//! ```rust,ignore
//! use vidtune_core::testing::MockSet;
//!
//! let mocks = MockSet::new();
//! mocks.source.set_title("BV1", "First Song").await;
//! mocks.fetcher.fail_item("BV2", "network timeout").await;
//!
//! let orchestrator = BatchOrchestrator::new(config, mocks.collaborators());
//! ```

mod mock_converter;
mod mock_fetcher;
mod mock_source;
mod mock_uploader;
mod probe;

pub use mock_converter::MockConverter;
pub use mock_fetcher::MockFetcher;
pub use mock_source::MockMediaSource;
pub use mock_uploader::{MockUploader, RecordedUpload};
pub use probe::{ConcurrencyProbe, ProbeGuard};

use std::sync::Arc;

use crate::worker::Collaborators;

/// One of each mock, wired together.
#[derive(Debug, Clone, Default)]
pub struct MockSet {
    pub source: Arc<MockMediaSource>,
    pub fetcher: Arc<MockFetcher>,
    pub converter: Arc<MockConverter>,
    pub uploader: Arc<MockUploader>,
}

impl MockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mocks as trait objects for a worker or orchestrator.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            source: self.source.clone(),
            fetcher: self.fetcher.clone(),
            converter: self.converter.clone(),
            uploader: self.uploader.clone(),
        }
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::config::{load_config_from_str, Config};
    use crate::task::BatchRequest;

    /// A valid config whose scratch directory lives under `scratch_dir`.
    pub fn config(scratch_dir: &Path, max_concurrency: usize) -> Config {
        let mut config = load_config_from_str(
            r#"
[source]
base_url = "http://upstream.test"

[uploader]
base_url = "http://cloud.test"
"#,
        )
        .unwrap_or_else(|e| panic!("fixture config must parse: {e}"));
        config.batch.scratch_dir = scratch_dir.to_path_buf();
        config.batch.max_concurrency = max_concurrency;
        config
    }

    /// A request for items `v1..=vN`.
    pub fn numbered_request(n: usize) -> BatchRequest {
        BatchRequest::new((1..=n).map(|i| format!("v{i}")))
    }
}
