//! Attachment upload (two-phase) and download (redirect resolution + streamed relay).

use axum::body::Bytes;
use futures_util::Stream;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};

use super::WorksClient;
use crate::error::GatewayError;
use crate::validate::validate_path_segment;

/// Inbound upload staged on local disk. The file is removed when the guard is dropped,
/// so every exit path of an upload (success, validation or transport failure) cleans up.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    file_name: String,
}

impl StagedFile {
    /// Reserve a unique path under `dir` for a file the client called `original_name`.
    /// Only the final path component of `original_name` is kept.
    pub fn new(dir: &Path, original_name: &str) -> Self {
        let file_name = Path::new(original_name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("upload")
            .to_string();
        let path = dir.join(format!("{}-{}", uuid::Uuid::new_v4(), file_name));
        Self { path, file_name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to delete staged upload {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Returned to the caller after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub file_id: String,
}

/// Where the bytes of an attachment can be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTarget {
    pub download_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadTicket {
    upload_url: String,
    file_id: String,
}

/// An in-flight download: upstream status and headers plus the unread body.
pub struct DownloadStream {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    response: reqwest::Response,
}

impl DownloadStream {
    /// Body chunks as they arrive from upstream.
    pub fn into_stream(self) -> impl Stream<Item = reqwest::Result<Bytes>> {
        self.response.bytes_stream()
    }
}

fn header_string(res: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    res.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl WorksClient {
    /// Register the file name, then stream the staged file as multipart to the returned
    /// upload URL. Consumes `staged`; the local file is gone when this returns.
    pub async fn upload(
        &self,
        token: &str,
        staged: StagedFile,
        file_type: &str,
    ) -> Result<UploadResult, GatewayError> {
        let ticket: UploadTicket = self
            .post_json(
                token,
                self.bot_url(&["attachments"]),
                &json!({ "fileName": staged.file_name() }),
            )
            .await
            .map_err(|e| GatewayError::Transfer(format!("registering upload: {}", e)))?
            .json()
            .await
            .map_err(|e| GatewayError::Transfer(format!("parsing upload registration: {}", e)))?;

        let file = tokio::fs::File::open(staged.path())
            .await
            .map_err(|e| GatewayError::Transfer(format!("opening staged file: {}", e)))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| GatewayError::Transfer(format!("reading staged file: {}", e)))?
            .len();
        let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::from(file), length)
            .file_name(staged.file_name().to_string())
            .mime_str(file_type)
            .map_err(|e| GatewayError::BadRequest(format!("invalid content type '{}': {}", file_type, e)))?;
        let form = reqwest::multipart::Form::new()
            .text("resourceName", staged.file_name().to_string())
            .part("file", part);

        let res = self
            .client
            .post(&ticket.upload_url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GatewayError::Transfer(format!("uploading file: {}", e)))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GatewayError::Transfer(format!("upload returned {} {}", status, body)));
        }
        log::info!("uploaded {} ({} bytes) as {}", staged.file_name(), length, ticket.file_id);
        Ok(UploadResult {
            file_id: ticket.file_id,
        })
    }

    /// Ask the attachment API where `file_id` lives. The API answers with a redirect whose
    /// `Location` is the download URL; a JSON `{downloadUrl}` body is accepted as well.
    pub async fn resolve_download(&self, token: &str, file_id: &str) -> Result<DownloadTarget, GatewayError> {
        let file_id = validate_path_segment(file_id, "fileId")?;
        let url = self.bot_url(&["attachments", file_id]);
        let res = self
            .no_redirect_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| GatewayError::Transfer(format!("resolving download URL: {}", e)))?;
        let status = res.status();
        if status.is_redirection() {
            return header_string(&res, LOCATION)
                .map(|download_url| DownloadTarget { download_url })
                .ok_or_else(|| GatewayError::Transfer("redirect response has no Location".to_string()));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(file_id.to_string()));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(GatewayError::Transfer(format!("resolving download URL: {} {}", status, body)));
        }
        res.json::<DownloadTarget>()
            .await
            .map_err(|_| GatewayError::Transfer("no download URL in response".to_string()))
    }

    /// Start fetching `download_url`; the body is left unread for the caller to relay.
    pub async fn stream_download(&self, download_url: &str, token: &str) -> Result<DownloadStream, GatewayError> {
        let res = self
            .client
            .get(download_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| GatewayError::Transfer(format!("downloading file: {}", e)))?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            log::debug!("download URL answered 404: {}", download_url);
            return Err(GatewayError::NotFound("attachment content".to_string()));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(GatewayError::Transfer(format!("download returned {} {}", status, body)));
        }
        Ok(DownloadStream {
            status,
            content_type: header_string(&res, CONTENT_TYPE),
            content_disposition: header_string(&res, CONTENT_DISPOSITION),
            response: res,
        })
    }
}
