//! Delivery of finished tracks to the destination cloud library.

mod config;
mod error;
mod http;
mod traits;
mod types;

pub use config::UploaderConfig;
pub use error::UploadError;
pub use http::HttpUploader;
pub use traits::Uploader;
pub use types::{UploadReceipt, UploadTarget};
