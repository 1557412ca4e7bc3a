use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::uploader::UploadTarget;

/// Where in the pipeline an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Metadata,
    Stream,
    Gate,
    Download,
    Cover,
    Transcode,
    Upload,
    Scratch,
    /// The worker itself died without reporting.
    Worker,
    Cancelled,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Metadata => "metadata",
            Stage::Stream => "stream",
            Stage::Gate => "gate",
            Stage::Download => "download",
            Stage::Cover => "cover",
            Stage::Transcode => "transcode",
            Stage::Upload => "upload",
            Stage::Scratch => "scratch",
            Stage::Worker => "worker",
            Stage::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single item's failure. `message` is the collaborator's error text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage}: {message}")]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    pub fn timed_out(stage: Stage, limit: Duration) -> Self {
        Self::new(
            stage,
            format!("{} timed out after {}s", stage, limit.as_secs()),
        )
    }

    pub fn cancelled(during: Stage) -> Self {
        Self::new(Stage::Cancelled, format!("cancelled during {}", during))
    }
}

/// One item of a batch, as handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemJob {
    /// Position in the submitted list.
    pub index: usize,
    pub item_id: String,
    /// Trimmed, non-empty display name override.
    pub name_override: Option<String>,
    pub target: UploadTarget,
}

/// The single result every worker produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub index: usize,
    pub item_id: String,
    /// Display title once metadata is known, the item id before that.
    pub label: String,
    pub result: Result<(), StageError>,
    pub elapsed: Duration,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Outcome for a worker that never reported.
    pub fn lost(index: usize, item_id: impl Into<String>, message: impl Into<String>) -> Self {
        let item_id = item_id.into();
        Self {
            index,
            label: item_id.clone(),
            item_id,
            result: Err(StageError::new(Stage::Worker, message)),
            elapsed: Duration::ZERO,
        }
    }
}

/// Upper bounds the worker enforces on each stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    /// Metadata, stream lookup and cover fetch.
    pub lookup: Duration,
    pub download: Duration,
    pub transcode: Duration,
    pub upload: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            lookup: Duration::from_secs(30),
            download: Duration::from_secs(600),
            transcode: Duration::from_secs(1200),
            upload: Duration::from_secs(300),
        }
    }
}

impl StageTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lookup: Duration::from_secs(config.source.timeout_secs),
            download: Duration::from_secs(config.download.timeout_secs),
            // Two ffmpeg passes, each bounded by the converter timeout.
            transcode: Duration::from_secs(config.converter.timeout_secs.saturating_mul(2)),
            upload: Duration::from_secs(config.uploader.timeout_secs),
        }
    }

    /// Same bound for every stage.
    pub fn uniform(limit: Duration) -> Self {
        Self {
            lookup: limit,
            download: limit,
            transcode: limit,
            upload: limit,
        }
    }
}
