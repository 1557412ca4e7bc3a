//! Raw media download over HTTP.

mod config;
mod error;
mod http;
mod traits;

pub use config::FetcherConfig;
pub use error::FetchError;
pub use http::HttpFetcher;
pub use traits::MediaFetcher;

pub(crate) use http::write_body_to_file;
