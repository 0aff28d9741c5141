//! `POST /merge` — finalize a session once every chunk has arrived.

use crate::envelope::ApiOk;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use crate::token;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub file_hash: String,
    pub chunks: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub url: String,
}

pub async fn merge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MergeRequest>,
) -> ServerResult<ApiOk<MergeResponse>> {
    let upload_token = headers
        .get("Upload-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Validation("missing Upload-Token header".to_string()))?;
    let claims = token::verify(&state.config.jwt_secret, upload_token)?;

    if req.chunks.is_empty() {
        return Err(ServerError::Integrity("cannot merge a session with no chunks".to_string()));
    }

    for digest in &req.chunks {
        if !state.chunk_store.has(digest).await {
            return Err(ServerError::Integrity(format!("chunk {digest} was never received")));
        }
    }

    let url = format!("/api/upload/file/{}/{}", claims.upload_id, claims.file_name);

    state
        .registry
        .complete(&claims.upload_id, req.file_hash, req.chunks, url.clone())
        .await?;

    Ok(ApiOk(MergeResponse { url }))
}
