//! Audio extraction and tagging.
//!
//! The [`Converter`] trait turns a downloaded media file plus a cover image
//! into a tagged MP3. [`FfmpegConverter`] does this in two ffmpeg passes:
//! first the audio track is extracted and re-encoded, then the cover is
//! scaled, padded and attached alongside ID3 title and artist tags.

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::FfmpegConverter;
pub use traits::Converter;
pub use types::{TrackTags, TranscodeJob, TranscodeResult};
