//! Upstream content API: item metadata, stream lookup and author images.

mod config;
mod error;
mod http;
mod traits;
mod types;

pub use config::SourceConfig;
pub use error::SourceError;
pub use http::HttpMediaSource;
pub use traits::MediaSource;
pub use types::{ItemMetadata, StreamLocation};
