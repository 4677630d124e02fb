//! JSON envelope shared by every handler.
//!
//! Success responses wrap a single named payload; failure responses carry
//! the message under `log` plus the HTTP status code, mirrored into the
//! body so browser clients can read it without touching response headers.

use axum::{Json, http::StatusCode};
use serde_json::{Value, json};

/// Wraps `payload` under `key` in the success envelope.
pub fn success(key: &str, payload: Value) -> Json<Value> {
    Json(json!({ "success": true, "status": 200, key: payload }))
}

/// The bare success envelope, used as an acknowledgement.
pub fn acknowledged() -> Json<Value> { Json(json!({ "success": true, "status": 200 })) }

/// Builds the failure envelope carrying `message`.
pub fn failure(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    let body = json!({
        "success": false,
        "status": status.as_u16(),
        "log": message,
    });
    (status, Json(body))
}
