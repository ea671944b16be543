//! `GET /health`: unauthenticated liveness probe, matching the rest of
//! this family of binaries, which always ships one.

use axum::response::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}
