//! `GET /healthz` — bare liveness probe, intentionally outside the
//! `{success, data, message}` envelope used by the functional API.

use axum::Json;
use serde_json::{json, Value};

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
