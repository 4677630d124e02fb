//! Liveness probe endpoint.

use axum::Json;
use serde_json::{Value, json};

pub async fn health() -> Json<Value> {
    Json(json!({
        "name": dendrite_base::PROJECT_NAME,
        "version": dendrite_base::PROJECT_VERSION,
    }))
}

#[cfg(test)]
mod tests {
    use super::health;

    #[tokio::test]
    async fn test_health_reports_name_and_version() {
        let body = health().await.0;

        assert_eq!(body["name"], "dendrite");
        assert_eq!(body["version"], dendrite_base::PROJECT_VERSION);
    }
}
