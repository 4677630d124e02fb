pub mod access;
pub mod containers;
pub mod health;
pub mod notebooks;
pub mod platform;

use serde::Serialize;
use serde_json::Value;

use crate::server::error::ApiError;

/// Serializes a cluster object for the response envelope.
fn encode<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|err| ApiError::internal(err.to_string()))
}
