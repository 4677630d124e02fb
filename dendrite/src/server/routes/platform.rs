//! Handlers serving platform facts the spawner form is built from.

use std::collections::BTreeSet;

use axum::{
    Json,
    extract::{Path, State},
};
use dendrite_base::consts::k8s::kinds;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::DynamicObject;
use serde_json::{Value, json};

use crate::server::{AppState, error::ApiError, response};

/// Serves the spawner form defaults from the cached UI config.
pub async fn spawner_config(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let defaults = state.spawner.get().await?;
    Ok(response::success("config", defaults))
}

/// Lists the configured GPU vendors whose limit key is installed on at
/// least one node.
pub async fn gpu_vendors(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let defaults = state.spawner.get().await?;
    let configured: BTreeSet<&str> = defaults
        .get("gpus")
        .and_then(|gpus| gpus.get("value"))
        .and_then(|value| value.get("vendors"))
        .and_then(Value::as_array)
        .map(|vendors| {
            vendors
                .iter()
                .filter_map(|vendor| vendor.get("limitsKey").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let mut installed = BTreeSet::new();
    for node in state.gateway.list_nodes().await? {
        let capacity = node
            .status
            .as_ref()
            .and_then(|status| status.capacity.as_ref())
            .filter(|capacity| !capacity.is_empty());
        match capacity {
            Some(capacity) => installed.extend(capacity.keys().cloned()),
            None => {
                let name = node.metadata.name.unwrap_or_default();
                tracing::debug!("Capacity was not available for node {name}");
            }
        }
    }

    let vendors: Vec<&str> =
        configured.into_iter().filter(|vendor| installed.contains(*vendor)).collect();
    Ok(response::success("vendors", json!(vendors)))
}

/// Lists volume claim summaries for the mount-selection form.
pub async fn persistent_volume_claims(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let claims = state.gateway.list_persistent_volume_claims(&namespace).await?;
    let summaries: Vec<Value> = claims.iter().map(claim_summary).collect();
    Ok(response::success("pvcs", json!(summaries)))
}

/// Lists PodDefault summaries the spawner form offers as toggles.
pub async fn pod_defaults(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let pod_defaults = state.gateway.list_custom(kinds::POD_DEFAULT, &namespace).await?;
    let summaries: Vec<Value> = pod_defaults.iter().map(pod_default_summary).collect();
    tracing::info!("Found poddefaults: {summaries:?}");
    Ok(response::success("poddefaults", json!(summaries)))
}

fn claim_summary(claim: &PersistentVolumeClaim) -> Value {
    let spec = claim.spec.as_ref();
    json!({
        "name": claim.metadata.name,
        "size": spec
            .and_then(|spec| spec.resources.as_ref())
            .and_then(|resources| resources.requests.as_ref())
            .and_then(|requests| requests.get("storage")),
        "mode": spec.and_then(|spec| spec.access_modes.as_ref()).and_then(|modes| modes.first()),
        "class": spec.and_then(|spec| spec.storage_class_name.as_ref()),
    })
}

/// The form label comes from the selector; PodDefaults without one stay
/// listed under `unknown` rather than disappearing.
fn pod_default_summary(pod_default: &DynamicObject) -> Value {
    let selector = pod_default.data.get("spec").and_then(|spec| spec.get("selector"));
    let label = selector
        .and_then(|selector| selector.get("matchLabels"))
        .and_then(Value::as_object)
        .and_then(|labels| labels.keys().next().cloned())
        .or_else(|| {
            selector
                .and_then(|selector| selector.get("matchExpressions"))
                .and_then(Value::as_array)
                .and_then(|expressions| expressions.first())
                .and_then(|expression| expression.get("key"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown".to_string());
    let desc = pod_default
        .data
        .get("spec")
        .and_then(|spec| spec.get("desc"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| pod_default.metadata.name.clone())
        .unwrap_or_default();

    json!({
        "name": pod_default.metadata.name,
        "label": label,
        "desc": desc,
    })
}
