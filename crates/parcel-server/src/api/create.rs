//! `POST /create` — register a new upload session.

use crate::envelope::ApiOk;
use crate::error::{ServerError, ServerResult};
use crate::registry::now;
use crate::state::AppState;
use crate::token;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    #[serde(default)]
    pub last_modified: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub upload_token: String,
    pub chunk_size: u64,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> ServerResult<ApiOk<CreateResponse>> {
    if req.file_name.trim().is_empty() {
        return Err(ServerError::Validation("fileName is required".to_string()));
    }
    if req.file_size == 0 {
        return Err(ServerError::Validation("fileSize must be greater than zero".to_string()));
    }
    if req.file_size > state.config.max_artifact_size {
        return Err(ServerError::Validation(format!(
            "fileSize {} exceeds the maximum artifact size of {} bytes",
            req.file_size, state.config.max_artifact_size
        )));
    }

    let upload_id = Uuid::new_v4().to_string();
    let created_at = now();

    state
        .registry
        .create(upload_id.clone(), req.file_name.clone(), req.file_size, req.file_type.clone())
        .await?;

    let upload_token = token::issue(
        &state.config.jwt_secret,
        &upload_id,
        &req.file_name,
        req.file_size,
        &req.file_type,
        created_at,
        state.config.token_ttl_secs,
    )?;

    Ok(ApiOk(CreateResponse {
        upload_token,
        chunk_size: state.config.default_chunk_size,
    }))
}
