//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while transcoding.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// FFmpeg binary not found.
    #[error("ffmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// Input media file not found.
    #[error("input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Cover image not found.
    #[error("cover art not found: {path}")]
    CoverArtMissing { path: PathBuf },

    /// Could not create the output directory.
    #[error("failed to create output directory: {path}")]
    OutputDirectoryFailed { path: PathBuf },

    /// ffmpeg ran but did not succeed.
    #[error("{step} failed: {reason}")]
    ConversionFailed {
        step: &'static str,
        reason: String,
        stderr: Option<String>,
    },

    /// ffmpeg did not finish in time and was killed.
    #[error("transcode timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The item was cancelled and ffmpeg was killed.
    #[error("transcode cancelled")]
    Cancelled,
}

impl ConverterError {
    pub fn conversion_failed(
        step: &'static str,
        reason: impl Into<String>,
        stderr: Option<String>,
    ) -> Self {
        Self::ConversionFailed {
            step,
            reason: reason.into(),
            stderr,
        }
    }
}
