//! Transport Adapter (C5): the sole point where the `Upload-Token` header is
//! attached. The controller depends only on the `TransportAdapter` trait and
//! never sees credentials directly (spec.md §4.5).

use crate::error::{ClientError, Result};
use crate::session::ChunkDescriptor;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct InitiateRequest {
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub last_modified: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitiateResponse {
    pub upload_token: String,
    pub chunk_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Chunk,
    File,
}

impl HashKind {
    fn as_str(&self) -> &'static str {
        match self {
            HashKind::Chunk => "chunk",
            HashKind::File => "file",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyResponse {
    pub has_file: bool,
    #[serde(default)]
    pub rest: Option<Vec<String>>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeRequest {
    pub file_hash: String,
    pub chunks: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeResponse {
    pub url: String,
}

/// Envelope every server JSON response is wrapped in (spec.md §6).
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

impl<T> Envelope<T> {
    /// Turn a parsed envelope into a typed result, classifying `success: false`
    /// by the response's HTTP status so the controller's retry policy can
    /// tell fatal errors (validation, auth) from ones worth retrying
    /// (spec.md §7's error taxonomy).
    fn into_data(self, status: StatusCode) -> Result<T> {
        if self.success {
            return self.data.ok_or_else(|| ClientError::Other("server reported success with no data".to_string()));
        }

        let message = self.message.unwrap_or_else(|| "request failed".to_string());
        Err(match status {
            StatusCode::BAD_REQUEST => ClientError::Validation(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
            StatusCode::CONFLICT => ClientError::Integrity(message),
            _ => ClientError::Other(message),
        })
    }
}

#[async_trait]
pub trait TransportAdapter: Send + Sync {
    async fn initiate(&self, req: InitiateRequest) -> Result<InitiateResponse>;

    async fn verify(&self, upload_token: &str, hash: &str, kind: HashKind, chunk_index: Option<u32>) -> Result<VerifyResponse>;

    async fn transfer_chunk(&self, upload_token: &str, file_path: &std::path::Path, descriptor: &ChunkDescriptor, bytes: Vec<u8>) -> Result<()>;

    async fn merge(&self, upload_token: &str, file_hash: &str, ordered_digests: Vec<String>) -> Result<MergeResponse>;
}

/// `reqwest`-backed transport, the only concrete `TransportAdapter`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(ClientError::Transport)?;
        Ok(Self { client, base_url: base_url.into() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl TransportAdapter for HttpTransport {
    async fn initiate(&self, req: InitiateRequest) -> Result<InitiateResponse> {
        let response = self.client.post(self.url("/create")).json(&req).send().await?;
        let status = response.status();
        let envelope: Envelope<InitiateResponse> = response.json().await?;
        envelope.into_data(status)
    }

    async fn verify(&self, upload_token: &str, hash: &str, kind: HashKind, chunk_index: Option<u32>) -> Result<VerifyResponse> {
        let mut request = self
            .client
            .patch(self.url("/verify"))
            .header("Upload-Token", upload_token)
            .header("Upload-Hash", hash)
            .header("Upload-Hash-Type", kind.as_str());

        if let Some(index) = chunk_index {
            request = request.header("Upload-Chunk-Index", index.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        let envelope: Envelope<VerifyResponse> = response.json().await?;
        envelope.into_data(status)
    }

    async fn transfer_chunk(&self, upload_token: &str, _file_path: &std::path::Path, descriptor: &ChunkDescriptor, bytes: Vec<u8>) -> Result<()> {
        let digest = descriptor.digest.clone().unwrap_or_default();
        let part = reqwest::multipart::Part::bytes(bytes).file_name("chunk.bin");
        let form = reqwest::multipart::Form::new()
            .text("chunkIndex", descriptor.index.to_string())
            .text("chunkHash", digest)
            .text("chunkStart", descriptor.start.to_string())
            .text("chunkEnd", descriptor.end.to_string())
            .part("chunk", part);

        let response = self.client.post(self.url("/chunk")).header("Upload-Token", upload_token).multipart(form).send().await?;
        let status = response.status();
        let envelope: Envelope<serde_json::Value> = response.json().await?;
        envelope.into_data(status).map(|_| ())
    }

    async fn merge(&self, upload_token: &str, file_hash: &str, ordered_digests: Vec<String>) -> Result<MergeResponse> {
        let req = MergeRequest { file_hash: file_hash.to_string(), chunks: ordered_digests };
        let response = self.client.post(self.url("/merge")).header("Upload-Token", upload_token).json(&req).send().await?;
        let status = response.status();
        let envelope: Envelope<MergeResponse> = response.json().await?;
        envelope.into_data(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_kind_serializes_to_protocol_strings() {
        assert_eq!(HashKind::Chunk.as_str(), "chunk");
        assert_eq!(HashKind::File.as_str(), "file");
    }

    #[test]
    fn url_joins_base_and_path_without_double_slash() {
        let transport = HttpTransport::new("http://localhost:8080/").unwrap();
        assert_eq!(transport.url("/create"), "http://localhost:8080/create");
    }

    #[test]
    fn envelope_classifies_failures_by_status_so_fatal_ones_skip_retry() {
        let envelope = Envelope::<()> { success: false, data: None, message: Some("missing fileName".to_string()) };
        let err = envelope.into_data(StatusCode::BAD_REQUEST).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, ClientError::Validation(_)));

        let envelope = Envelope::<()> { success: false, data: None, message: Some("expired token".to_string()) };
        let err = envelope.into_data(StatusCode::UNAUTHORIZED).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, ClientError::Unauthorized(_)));

        let envelope = Envelope::<()> { success: false, data: None, message: Some("server hiccup".to_string()) };
        let err = envelope.into_data(StatusCode::INTERNAL_SERVER_ERROR).unwrap_err();
        assert!(!err.is_fatal());
    }
}
