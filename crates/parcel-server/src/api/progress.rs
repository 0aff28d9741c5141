//! `GET /progress/:uploadId` — current session record, for polling clients.

use crate::envelope::ApiOk;
use crate::error::{ServerError, ServerResult};
use crate::registry::SessionRecord;
use crate::state::AppState;
use axum::extract::{Path, State};

pub async fn progress(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ServerResult<ApiOk<SessionRecord>> {
    state
        .registry
        .get(&upload_id)
        .await
        .map(ApiOk)
        .ok_or_else(|| ServerError::NotFound(format!("no upload session {upload_id}")))
}
