//! The `{success, data?, message?}` response envelope every endpoint
//! (other than the bare health check) wraps its JSON body in.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub struct ApiOk<T>(pub T);

impl<T: Serialize> IntoResponse for ApiOk<T> {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": true,
            "data": self.0,
        });
        (StatusCode::OK, Json(body)).into_response()
    }
}
