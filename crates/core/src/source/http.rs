//! HTTP client for the upstream content API.
//!
//! Endpoints, relative to `base_url`:
//!
//! | Call                 | Request                 | Response                         |
//! |----------------------|-------------------------|----------------------------------|
//! | session check        | `GET /session`          | any 2xx                          |
//! | item metadata        | `GET /items/{id}`       | `{title, description, author, streamRef}` |
//! | stream lookup        | `GET /streams/{ref}`    | `{urls: [..]}`                   |
//! | author card          | `GET /authors/{id}`     | `{id, name, avatarUrl}`          |

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::config::SourceConfig;
use super::error::SourceError;
use super::traits::MediaSource;
use super::types::{ItemMetadata, StreamLocation};
use crate::fetcher::{write_body_to_file, FetchError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemResponse {
    title: String,
    #[serde(default)]
    description: String,
    author: AuthorRef,
    stream_ref: String,
}

#[derive(Debug, Deserialize)]
struct AuthorRef {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorCard {
    #[serde(default)]
    avatar_url: Option<String>,
}

/// [`MediaSource`] backed by the upstream REST API.
pub struct HttpMediaSource {
    client: reqwest::Client,
    config: SourceConfig,
}

impl HttpMediaSource {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| SourceError::Unavailable(format!("invalid user agent: {}", e)))?;
        headers.insert(USER_AGENT, user_agent);
        if let Some(cookie) = config.cookie.as_deref().filter(|c| !c.is_empty()) {
            let mut value = HeaderValue::from_str(cookie)
                .map_err(|e| SourceError::Unavailable(format!("invalid cookie: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                SourceError::Unavailable(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        kind: &'static str,
        id: &str,
    ) -> Result<T, SourceError> {
        let response = self.client.get(self.url(path)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(SourceError::not_found(kind, id)),
            status if !status.is_success() => Err(SourceError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            }),
            _ => Ok(response.json::<T>().await?),
        }
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn prepare(&self) -> Result<(), SourceError> {
        let response = self
            .client
            .get(self.url("/session"))
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "session check returned status {}",
                response.status().as_u16()
            )));
        }
        debug!(source = %self.config.base_url, "Upstream session ready");
        Ok(())
    }

    async fn fetch_metadata(&self, item_id: &str) -> Result<ItemMetadata, SourceError> {
        let path = format!("/items/{}", urlencoding::encode(item_id));
        let item: ItemResponse = self.get_json(&path, "item", item_id).await?;

        Ok(ItemMetadata {
            item_id: item_id.to_string(),
            title: item.title,
            description: item.description,
            author_id: item.author.id,
            author_name: item.author.name,
            stream_ref: item.stream_ref,
        })
    }

    async fn resolve_stream(&self, stream_ref: &str) -> Result<StreamLocation, SourceError> {
        let path = format!("/streams/{}", urlencoding::encode(stream_ref));
        let stream: StreamResponse = self.get_json(&path, "stream", stream_ref).await?;

        let url = stream
            .urls
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NoStream(stream_ref.to_string()))?;

        Ok(StreamLocation::new(url)
            .with_header("Referer", self.config.effective_referer())
            .with_header("User-Agent", self.config.user_agent.clone()))
    }

    async fn fetch_author_image(
        &self,
        author_id: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, SourceError> {
        let path = format!("/authors/{}", urlencoding::encode(author_id));
        let card: AuthorCard = self.get_json(&path, "author", author_id).await?;
        let avatar_url = card
            .avatar_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| SourceError::InvalidResponse(format!("author {} has no avatar", author_id)))?;

        let dest = dest_dir.join("cover.jpg");
        let response = self.client.get(&avatar_url).send().await?;
        write_body_to_file(response, &dest).await.map_err(|e| match e {
            FetchError::Status { status } => SourceError::Status {
                status,
                path: avatar_url.clone(),
            },
            FetchError::Timeout => SourceError::Timeout,
            FetchError::Io(io) => SourceError::Io(io),
            other => {
                warn!(author_id, error = %other, "Avatar download failed");
                SourceError::Transport(other.to_string())
            }
        })?;

        Ok(dest)
    }
}
