//! Read, delete and pod-introspection handlers for notebook workloads.
//!
//! The list endpoint merges two sources: Notebook custom resources and the
//! Deployments representing ad-hoc containers. Both collapse into the same
//! summary shape so the frontend renders them in one table.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use dendrite_base::consts::k8s::{self, kinds};
use k8s_openapi::api::{apps::v1::Deployment, core::v1::Pod};
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    server::{AppState, error::ApiError, response, routes::encode},
    workload,
};

/// One row of the workload table, shared by notebooks and custom containers.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSummary {
    pub name: String,
    pub namespace: String,
    pub owner: Option<String>,
    pub server_type: Option<String>,
    pub last_activity: Option<String>,
    pub age: Option<String>,
    pub image: Option<String>,
    pub short_image: Option<String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub volumes: Vec<String>,
    pub pod_name: Option<String>,
    pub ip: Option<String>,
    pub phase: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodQuery {
    pub label_selector: Option<String>,
}

pub async fn list_notebooks(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let notebooks = state.gateway.list_custom(kinds::NOTEBOOK, &namespace).await?;
    let pods = state.gateway.list_pods(&namespace, None).await?;
    let deployments = state.gateway.list_deployments(&namespace).await?;

    let mut summaries: Vec<WorkloadSummary> =
        notebooks.iter().map(|notebook| notebook_summary(notebook, &pods)).collect();
    summaries.extend(
        deployments
            .iter()
            .filter(|deployment| is_custom_container(deployment))
            .map(|deployment| container_summary(deployment, &pods)),
    );

    Ok(response::success("notebooks", encode(&summaries)?))
}

pub async fn get_notebook(
    State(state): State<AppState>,
    Path((namespace, notebook_name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let notebook = state.gateway.get_custom(kinds::NOTEBOOK, &namespace, &notebook_name).await?;
    let pods = state.gateway.list_pods(&namespace, None).await?;
    Ok(response::success("notebook", encode(&notebook_summary(&notebook, &pods))?))
}

pub async fn delete_notebook(
    State(state): State<AppState>,
    Path((namespace, notebook_name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    tracing::info!("Deleting notebook {namespace}/{notebook_name}");
    state.gateway.delete_custom(kinds::NOTEBOOK, &namespace, &notebook_name).await?;
    Ok(response::success(
        "message",
        json!(format!("Notebook {notebook_name} successfully deleted.")),
    ))
}

pub async fn get_notebook_pod(
    State(state): State<AppState>,
    Path((namespace, notebook_name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let pod = workload::resolve_pod(state.gateway.as_ref(), &namespace, &notebook_name).await?;
    Ok(response::success("pod", encode(&pod)?))
}

/// Looks up pods by an arbitrary label selector and returns the first match.
pub async fn get_pod(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(params): Query<PodQuery>,
) -> Result<Json<Value>, ApiError> {
    let pods = state.gateway.list_pods(&namespace, params.label_selector.as_deref()).await?;
    let pod = pods.into_iter().next().ok_or_else(|| ApiError::not_found("No pod detected."))?;
    Ok(response::success("pod", encode(&pod)?))
}

pub async fn get_pod_logs(
    State(state): State<AppState>,
    Path((namespace, notebook_name, pod_name)): Path<(String, String, String)>,
) -> Result<Json<Value>, ApiError> {
    // The notebook container is named after the workload.
    let logs = state.gateway.pod_logs(&namespace, &pod_name, &notebook_name).await?;
    let lines: Vec<&str> = logs.split('\n').collect();
    Ok(response::success("logs", json!(lines)))
}

fn notebook_summary(notebook: &DynamicObject, pods: &[Pod]) -> WorkloadSummary {
    let name = notebook.metadata.name.clone().unwrap_or_default();
    let namespace = notebook.metadata.namespace.clone().unwrap_or_default();
    let annotations = notebook.metadata.annotations.clone().unwrap_or_default();

    let container = &notebook.data["spec"]["template"]["spec"]["containers"][0];
    let image = container["image"].as_str().map(String::from);
    let backing_pod = pods.iter().find(|pod| {
        pod.metadata
            .labels
            .as_ref()
            .is_some_and(|labels| labels.get(k8s::labels::NOTEBOOK_NAME) == Some(&name))
    });

    WorkloadSummary {
        namespace,
        owner: annotations.get(k8s::annotations::CREATOR).cloned(),
        server_type: annotations.get(k8s::annotations::SERVER_TYPE).cloned(),
        last_activity: annotations.get(k8s::annotations::LAST_ACTIVITY).cloned(),
        age: notebook.metadata.creation_timestamp.as_ref().map(|time| time.0.to_string()),
        short_image: image.as_deref().map(short_image),
        image,
        cpu: container["resources"]["requests"]["cpu"].as_str().map(String::from),
        memory: container["resources"]["requests"]["memory"].as_str().map(String::from),
        volumes: container["volumeMounts"]
            .as_array()
            .map(|mounts| {
                mounts.iter().filter_map(|mount| mount["name"].as_str().map(String::from)).collect()
            })
            .unwrap_or_default(),
        pod_name: backing_pod.and_then(|pod| pod.metadata.name.clone()),
        ip: backing_pod.and_then(pod_ip),
        phase: backing_pod.and_then(pod_phase),
        name,
    }
}

fn container_summary(deployment: &Deployment, pods: &[Pod]) -> WorkloadSummary {
    let name = deployment.metadata.name.clone().unwrap_or_default();
    let namespace = deployment.metadata.namespace.clone().unwrap_or_default();
    let annotations = deployment.metadata.annotations.clone().unwrap_or_default();

    let container = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|spec| spec.containers.first());
    let image = container.and_then(|container| container.image.clone());
    let requests = container
        .and_then(|container| container.resources.as_ref())
        .and_then(|resources| resources.requests.as_ref());

    let backing_pod = pods.iter().find(|pod| {
        pod.metadata
            .labels
            .as_ref()
            .is_some_and(|labels| labels.get(k8s::labels::APP) == Some(&name))
    });

    WorkloadSummary {
        namespace,
        owner: annotations.get(k8s::annotations::CREATOR).cloned(),
        server_type: Some("container".to_string()),
        last_activity: None,
        age: deployment.metadata.creation_timestamp.as_ref().map(|time| time.0.to_string()),
        short_image: image.as_deref().map(short_image),
        image,
        cpu: requests.and_then(|requests| requests.get("cpu").map(|quantity| quantity.0.clone())),
        memory: requests
            .and_then(|requests| requests.get("memory").map(|quantity| quantity.0.clone())),
        volumes: container
            .and_then(|container| container.volume_mounts.as_ref())
            .map(|mounts| mounts.iter().map(|mount| mount.name.clone()).collect())
            .unwrap_or_default(),
        pod_name: backing_pod.and_then(|pod| pod.metadata.name.clone()),
        ip: backing_pod.and_then(pod_ip),
        phase: backing_pod.and_then(pod_phase),
        name,
    }
}

fn is_custom_container(deployment: &Deployment) -> bool {
    deployment.metadata.labels.as_ref().is_some_and(|labels| {
        labels.get(k8s::labels::CONTAINER_TYPE).map(String::as_str)
            == Some(k8s::labels::CUSTOM_CONTAINER)
    })
}

fn short_image(image: &str) -> String { image.rsplit('/').next().unwrap_or(image).to_string() }

fn pod_ip(pod: &Pod) -> Option<String> {
    pod.status.as_ref().and_then(|status| status.pod_ip.clone())
}

fn pod_phase(pod: &Pod) -> Option<String> {
    pod.status.as_ref().and_then(|status| status.phase.clone())
}
