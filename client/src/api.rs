use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, multipart, Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use verdict_core::input::{validate_upload, validate_url, InputError, UploadPayload};
use verdict_core::models::{HistoryPage, HistoryRecord, RecordDraft};
use verdict_core::wire::{DeleteResponse, DetectResponse, ErrorBody, HistoryListResponse, SaveResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not signed in or session expired")]
    Unauthorized,

    #[error("history not found or unauthorized")]
    NotFound,

    #[error("{message}")]
    Rejected { status: u16, message: String, details: Option<String> },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String, details: Option<String> },

    #[error("cannot reach server: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error(transparent)]
    Input(#[from] InputError),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound)
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { details, .. } | ClientError::Server { details, .. } => details.as_deref(),
            _ => None,
        }
    }
}

/// The history operations the dashboard cache depends on.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    async fn list(&self, limit: u64, skip: u64) -> Result<HistoryPage, ClientError>;
    async fn remove(&self, id: &str) -> Result<(), ClientError>;
}

/// Typed client for the daemon's HTTP API.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(base: &str, token: Option<String>) -> Result<Self, ClientError> {
        let mut base = Url::parse(base).map_err(|e| ClientError::Input(InputError::InvalidUrl(e.to_string())))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { client, base, token: token.filter(|t| !t.trim().is_empty()) })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base.join(path).map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = self.authorized(builder).send().await.map_err(|e| ClientError::Transport(e.to_string()))?;
        decode(response).await
    }

    pub async fn health(&self) -> Result<serde_json::Value, ClientError> {
        self.send(self.client.get(self.endpoint("health")?)).await
    }

    pub async fn detect_url(&self, url: &str) -> Result<DetectResponse, ClientError> {
        let url = validate_url(url)?;
        debug!(%url, "detect url");
        self.send(self.client.post(self.endpoint("detect")?).json(&serde_json::json!({ "url": url })))
            .await
    }

    /// Upload an image. Size and type are checked locally before sending.
    pub async fn detect_upload(&self, upload: UploadPayload) -> Result<DetectResponse, ClientError> {
        let upload = validate_upload(upload)?;
        debug!(bytes = upload.bytes.len(), "detect upload");
        let filename = upload.filename.unwrap_or_else(|| "image".to_string());
        let part = multipart::Part::bytes(upload.bytes)
            .file_name(filename)
            .mime_str(&upload.content_type)
            .map_err(|e| ClientError::Input(InputError::UnsupportedType(e.to_string())))?;
        let form = multipart::Form::new().part("image", part);
        self.send(self.client.post(self.endpoint("detect")?).multipart(form)).await
    }

    pub async fn detect_file(&self, path: &Path) -> Result<DetectResponse, ClientError> {
        let content_type = content_type_for_path(path)
            .ok_or_else(|| InputError::UnsupportedType(path.display().to_string()))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::Input(InputError::Malformed(format!("{}: {e}", path.display()))))?;
        let filename = path.file_name().map(|n| n.to_string_lossy().into_owned());
        self.detect_upload(UploadPayload { bytes, content_type: content_type.to_string(), filename }).await
    }

    pub async fn save(&self, draft: &RecordDraft) -> Result<HistoryRecord, ClientError> {
        draft.validate()?;
        let saved: SaveResponse = self.send(self.client.post(self.endpoint("history")?).json(draft)).await?;
        Ok(saved.data)
    }
}

#[async_trait]
impl HistoryApi for HttpApi {
    async fn list(&self, limit: u64, skip: u64) -> Result<HistoryPage, ClientError> {
        let builder = self
            .client
            .get(self.endpoint("history")?)
            .query(&[("limit", limit.to_string()), ("skip", skip.to_string())]);
        let body: HistoryListResponse = self.send(builder).await?;
        Ok(body.into_page())
    }

    async fn remove(&self, id: &str) -> Result<(), ClientError> {
        let builder = self.client.delete(self.endpoint("history")?).query(&[("id", id)]);
        let body: DeleteResponse = self.send(builder).await?;
        if body.success {
            Ok(())
        } else {
            Err(ClientError::Decode(body.message))
        }
    }
}

/// MIME type for the upload extensions the service accepts.
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|e| ClientError::Transport(e.to_string()))?;

    if status.is_success() {
        return serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()));
    }

    let (message, details) = match serde_json::from_slice::<ErrorBody>(&bytes) {
        Ok(body) => (body.error, body.details),
        Err(_) => (String::from_utf8_lossy(&bytes).trim().to_string(), None),
    };
    Err(match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::NOT_FOUND => ClientError::NotFound,
        s if s.is_client_error() => ClientError::Rejected { status: s.as_u16(), message, details },
        s => ClientError::Server { status: s.as_u16(), message, details },
    })
}
