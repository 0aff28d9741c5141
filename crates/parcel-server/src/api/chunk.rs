//! `POST /chunk` — receive one chunk's bytes over multipart form data.

use crate::envelope::ApiOk;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use crate::token;
use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use bytes::Bytes;

pub async fn upload_chunk(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ServerResult<ApiOk<serde_json::Value>> {
    let upload_token = headers
        .get("Upload-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Validation("missing Upload-Token header".to_string()))?;
    token::verify(&state.config.jwt_secret, upload_token)?;

    let mut bytes: Option<Bytes> = None;
    let mut chunk_hash: Option<String> = None;
    let mut chunk_index: Option<u32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "chunk" => {
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ServerError::Validation(format!("failed to read chunk field: {e}")))?,
                );
            }
            "chunkHash" => {
                chunk_hash = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ServerError::Validation(format!("invalid chunkHash field: {e}")))?,
                );
            }
            "chunkIndex" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::Validation(format!("invalid chunkIndex field: {e}")))?;
                chunk_index = Some(
                    text.parse()
                        .map_err(|_| ServerError::Validation("chunkIndex must be an integer".to_string()))?,
                );
            }
            // chunkStart / chunkEnd are accepted but not required for
            // storage: the digest alone addresses the chunk, and ordering
            // is restored from the client-supplied list at merge time.
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    let bytes = bytes.ok_or_else(|| ServerError::Validation("missing chunk field".to_string()))?;
    let chunk_hash = chunk_hash.ok_or_else(|| ServerError::Validation("missing chunkHash field".to_string()))?;
    let _ = chunk_index;

    if bytes.len() as u64 > state.config.max_chunk_size {
        return Err(ServerError::Validation(format!(
            "chunk size {} exceeds the maximum of {} bytes",
            bytes.len(),
            state.config.max_chunk_size
        )));
    }

    state.chunk_store.write(&chunk_hash, &bytes).await?;

    Ok(ApiOk(serde_json::json!({})))
}
