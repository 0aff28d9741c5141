//! `PATCH /verify` — ask whether a chunk or whole file is already stored.

use crate::envelope::ApiOk;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use crate::token;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub has_file: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn header(headers: &HeaderMap, name: &str) -> ServerResult<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| ServerError::Validation(format!("missing {name} header")))
}

pub async fn verify(State(state): State<AppState>, headers: HeaderMap) -> ServerResult<ApiOk<VerifyResponse>> {
    let upload_token = header(&headers, "Upload-Token")?;
    let hash = header(&headers, "Upload-Hash")?;
    let hash_type = header(&headers, "Upload-Hash-Type")?;
    token::verify(&state.config.jwt_secret, &upload_token)?;

    match hash_type.as_str() {
        "chunk" => {
            let has_file = state.chunk_store.has(&hash).await;
            Ok(ApiOk(VerifyResponse { has_file, rest: None, url: None }))
        }
        "file" => {
            if let Some(record) = state.registry.find_by_hash(&hash).await {
                return Ok(ApiOk(VerifyResponse {
                    has_file: true,
                    rest: None,
                    url: record.artifact_url,
                }));
            }

            // The session isn't completed yet, so `chunks` has never been
            // populated (it's only written at merge time). `rest` is
            // therefore always empty here — preserved as-specified rather
            // than inferring a different intent for an unmerged session.
            Ok(ApiOk(VerifyResponse {
                has_file: false,
                rest: Some(Vec::new()),
                url: None,
            }))
        }
        other => Err(ServerError::Validation(format!("unknown Upload-Hash-Type: {other}"))),
    }
}
