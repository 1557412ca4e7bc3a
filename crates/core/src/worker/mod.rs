//! Per-item pipeline: metadata, stream lookup, download, cover, transcode
//! and upload, reduced to exactly one [`ItemOutcome`].

mod item;
mod scratch;
mod types;

pub use item::{Collaborators, ItemWorker};
pub use scratch::{sanitize_filename, ScratchDir};
pub use types::{ItemJob, ItemOutcome, Stage, StageError, StageTimeouts};
