//! `GET /file/:uploadId/:fileName` — stream the materialized artifact.

use crate::error::{ServerError, ServerResult};
use crate::registry::SessionStatus;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;

pub async fn download(
    State(state): State<AppState>,
    Path((upload_id, file_name)): Path<(String, String)>,
) -> ServerResult<Response> {
    let record = state
        .registry
        .get(&upload_id)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("no upload session {upload_id}")))?;

    if record.status != SessionStatus::Completed {
        return Err(ServerError::NotFound(format!("upload {upload_id} is not complete")));
    }
    if record.file_name != file_name {
        return Err(ServerError::NotFound("file name does not match this upload".to_string()));
    }

    let path = state.assembly.materialize(&record, &state.chunk_store).await?;
    let file = tokio::fs::File::open(&path).await?;
    let content_length = file.metadata().await?.len();
    let stream = tokio_util::io::ReaderStream::new(file);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, content_length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", record.file_name),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ServerError::Internal(e.to_string()))
}
