//! Parcel Server: session registry, content-addressed chunk store, and
//! assembly service behind the upload HTTP protocol.

pub mod api;
pub mod assembly;
pub mod chunk_store;
pub mod config;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod state;
pub mod token;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;
use state::AppState;
use tower_http::trace::TraceLayer;

/// Build the Axum router: the functional upload API plus a bare health
/// endpoint, wrapped in request tracing. The multipart body size limit is
/// derived from the configured max chunk size, with headroom for
/// multipart boundaries and the other form fields.
pub fn router(state: AppState) -> Router {
    let chunk_body_limit = state.config.max_chunk_size as usize + 64 * 1024;

    Router::new()
        .route("/create", post(api::create::create))
        .route("/verify", patch(api::verify::verify))
        .route(
            "/chunk",
            post(api::chunk::upload_chunk).layer(DefaultBodyLimit::max(chunk_body_limit)),
        )
        .route("/merge", post(api::merge::merge))
        .route("/file/:upload_id/:file_name", get(api::file::download))
        .route("/progress/:upload_id", get(api::progress::progress))
        .route("/healthz", get(api::health::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
