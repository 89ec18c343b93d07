use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::Value;

/// 200 with the standard success envelope.
pub fn ok(body: Value) -> impl IntoResponse {
    (StatusCode::OK, Json(body))
}

/// 201 with the standard success envelope.
pub fn created(body: Value) -> impl IntoResponse {
    (StatusCode::CREATED, Json(body))
}
