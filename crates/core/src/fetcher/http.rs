//! reqwest-based fetcher.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::config::FetcherConfig;
use super::error::FetchError;
use super::traits::MediaFetcher;
use crate::source::StreamLocation;

/// Streams a successful response body into `dest`.
///
/// Non-2xx responses are rejected before the file is created. On any error
/// the partial file is removed.
pub(crate) async fn write_body_to_file(
    mut response: reqwest::Response,
    dest: &Path,
) -> Result<u64, FetchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
        });
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written: u64 = 0;
    let copied = async {
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok::<u64, FetchError>(written)
    }
    .await;

    if copied.is_err() {
        drop(file);
        let _ = tokio::fs::remove_file(dest).await;
    }
    copied
}

/// Downloads media with the headers the stream host requires.
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn build_headers(&self, location: &StreamLocation) -> Result<HeaderMap, FetchError> {
        let mut headers = HeaderMap::new();
        if let Some(ua) = &self.config.user_agent {
            if let Ok(value) = HeaderValue::from_str(ua) {
                headers.insert(USER_AGENT, value);
            }
        }
        for (name, value) in &location.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| FetchError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| FetchError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn download(&self, location: &StreamLocation, dest: &Path) -> Result<u64, FetchError> {
        let headers = self.build_headers(location)?;
        let response = self.client.get(&location.url).headers(headers).send().await?;
        let bytes = write_body_to_file(response, dest).await?;
        debug!(url = %location.url, bytes, dest = %dest.display(), "Download finished");
        Ok(bytes)
    }
}
