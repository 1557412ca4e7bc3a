//! Types for transcode jobs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// ID3 tags written into the output file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    /// Written even when empty so no album tag leaks from the source.
    #[serde(default)]
    pub album: String,
}

impl TrackTags {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: String::new(),
        }
    }

    /// Convert to ffmpeg metadata arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-metadata".to_string(),
            format!("title={}", self.title),
            "-metadata".to_string(),
            format!("artist={}", self.artist),
            "-metadata".to_string(),
            format!("album={}", self.album),
        ]
    }
}

/// One item's transcode request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeJob {
    /// Downloaded media file.
    pub input_path: PathBuf,
    /// Author image to attach as front cover.
    pub cover_path: PathBuf,
    /// Final MP3 path.
    pub output_path: PathBuf,
    pub tags: TrackTags,
}

impl TranscodeJob {
    /// Path of the untagged audio produced by the first pass.
    pub fn intermediate_path(&self) -> PathBuf {
        let stem = self
            .output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        self.output_path
            .with_file_name(format!("{}.audio.mp3", stem))
    }
}

/// Result of a successful transcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeResult {
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    pub duration_ms: u64,
}
