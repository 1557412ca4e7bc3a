//! Client for the destination library's upload API.
//!
//! One upload is a short conversation:
//!
//! 1. `POST /uploads/check` with the file digest. The service answers with an
//!    upload id and whether it still needs the bytes.
//! 2. `POST /uploads` (multipart) with the file, skipped when not needed.
//! 3. `POST /uploads/{id}/publish` to attach the track to the account.
//!    `409 Conflict` means the track is already in the library.
//! 4. `POST /collections/{collectionId}/tracks` when a collection was requested.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::config::UploaderConfig;
use super::error::UploadError;
use super::traits::Uploader;
use super::types::{UploadReceipt, UploadTarget};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest<'a> {
    md5: &'a str,
    size: u64,
    filename: &'a str,
    ext: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckResponse {
    upload_id: String,
    need_upload: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    track_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionAdd<'a> {
    track_id: &'a str,
}

/// [`Uploader`] speaking the destination's REST API.
pub struct HttpUploader {
    client: reqwest::Client,
    config: UploaderConfig,
}

impl HttpUploader {
    pub fn new(config: UploaderConfig) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UploadError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let request = self.client.post(url);
        match self.config.token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn ensure_success(step: &'static str, status: StatusCode) -> Result<(), UploadError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(UploadError::Status {
            step,
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    fn name(&self) -> &str {
        "http"
    }

    async fn upload(
        &self,
        path: &Path,
        target: &UploadTarget,
    ) -> Result<UploadReceipt, UploadError> {
        let data = tokio::fs::read(path).await?;
        let md5 = format!("{:x}", md5::compute(&data));
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "track.mp3".to_string());
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();

        let response = self
            .post("/uploads/check")
            .json(&CheckRequest {
                md5: &md5,
                size: data.len() as u64,
                filename: &filename,
                ext: &ext,
            })
            .send()
            .await?;
        ensure_success("upload check", response.status())?;
        let check: CheckResponse = response.json().await?;

        if check.need_upload {
            let size = data.len();
            let part = Part::bytes(data)
                .file_name(filename.clone())
                .mime_str("audio/mpeg")?;
            let form = Form::new()
                .text("uploadId", check.upload_id.clone())
                .text("md5", md5.clone())
                .part("file", part);
            let response = self.post("/uploads").multipart(form).send().await?;
            ensure_success("file upload", response.status())?;
            debug!(upload_id = %check.upload_id, size, "File transferred");
        } else {
            debug!(upload_id = %check.upload_id, "Destination already holds content, skipping transfer");
        }

        let response = self
            .post(&format!(
                "/uploads/{}/publish",
                urlencoding::encode(&check.upload_id)
            ))
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(UploadError::AlreadyExists);
        }
        ensure_success("publish", response.status())?;
        let published: PublishResponse = response.json().await?;

        let collection_id = target.collection();
        if let Some(collection_id) = collection_id {
            let response = self
                .post(&format!("/collections/{}/tracks", collection_id))
                .json(&CollectionAdd {
                    track_id: &published.track_id,
                })
                .send()
                .await?;
            ensure_success("collection add", response.status())?;
        }

        info!(
            file = %filename,
            track_id = %published.track_id,
            collection_id = ?collection_id,
            "Track uploaded"
        );

        Ok(UploadReceipt {
            track_id: published.track_id,
            md5,
            transferred: check.need_upload,
            collection_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn track(dir: &TempDir) -> std::path::PathBuf {
        let file = dir.path().join("Song.mp3");
        std::fs::write(&file, b"ID3 fake mp3").unwrap();
        file
    }

    async fn mount_check(server: &MockServer, need_upload: bool) {
        let md5 = format!("{:x}", md5::compute(b"ID3 fake mp3"));
        Mock::given(method("POST"))
            .and(path("/uploads/check"))
            .and(body_partial_json(json!({"md5": md5, "ext": "mp3"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uploadId": "up-1",
                "needUpload": need_upload
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_publish(server: &MockServer, status: u16) {
        Mock::given(method("POST"))
            .and(path("/uploads/up-1/publish"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"trackId": "t-9"})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_upload_full_flow_with_collection() {
        let server = MockServer::start().await;
        mount_check(&server, true).await;
        Mock::given(method("POST"))
            .and(path("/uploads"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        mount_publish(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/collections/77/tracks"))
            .and(body_partial_json(json!({"trackId": "t-9"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let uploader = HttpUploader::new(UploaderConfig::new(server.uri()).with_token("secret"))
            .unwrap();
        let receipt = uploader
            .upload(
                &track(&dir),
                &UploadTarget {
                    save_to_collection: true,
                    collection_id: Some(77),
                },
            )
            .await
            .unwrap();

        assert_eq!(receipt.track_id, "t-9");
        assert!(receipt.transferred);
        assert_eq!(receipt.collection_id, Some(77));
    }

    #[tokio::test]
    async fn test_upload_skips_transfer_when_not_needed() {
        let server = MockServer::start().await;
        mount_check(&server, false).await;
        Mock::given(method("POST"))
            .and(path("/uploads"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_publish(&server, 200).await;

        let dir = TempDir::new().unwrap();
        let uploader = HttpUploader::new(UploaderConfig::new(server.uri())).unwrap();
        let receipt = uploader
            .upload(&track(&dir), &UploadTarget::default())
            .await
            .unwrap();

        assert!(!receipt.transferred);
        assert_eq!(receipt.collection_id, None);
    }

    #[tokio::test]
    async fn test_upload_conflict_is_already_exists() {
        let server = MockServer::start().await;
        mount_check(&server, false).await;
        mount_publish(&server, 409).await;

        let dir = TempDir::new().unwrap();
        let uploader = HttpUploader::new(UploaderConfig::new(server.uri())).unwrap();
        let err = uploader
            .upload(&track(&dir), &UploadTarget::default())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::AlreadyExists));
        assert_eq!(err.to_string(), "track already exists");
    }

    #[tokio::test]
    async fn test_upload_check_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/uploads/check"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let uploader = HttpUploader::new(UploaderConfig::new(server.uri())).unwrap();
        let err = uploader
            .upload(&track(&dir), &UploadTarget::default())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "upload check returned status 503");
        assert!(matches!(err, UploadError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let uploader = HttpUploader::new(UploaderConfig::new("http://127.0.0.1:1")).unwrap();
        let err = uploader
            .upload(Path::new("/nonexistent/x.mp3"), &UploadTarget::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Io(_)));
    }
}
