//! Handlers managing ad-hoc container Deployments.
//!
//! A custom container is a single-replica Deployment labeled
//! `container-type=custom-container` so the workload listing can merge it
//! with notebook servers. Both handlers fold every failure into one stable
//! message with the underlying error appended, matching what the frontend
//! displays verbatim.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use dendrite_base::consts::{self, k8s};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec,
            PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, ResourceRequirements,
            Volume, VolumeMount, VolumeResourceRequirements,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity,
        apis::meta::v1::{LabelSelector, ObjectMeta},
    },
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::server::{AppState, error::ApiError, response, routes::encode};

#[derive(Debug, Deserialize)]
pub struct CreateContainerRequest {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub ports: Vec<i32>,
    #[serde(default)]
    pub resources: BTreeMap<String, Quantity>,
    #[serde(default)]
    pub envs: Vec<EnvEntry>,
    #[serde(default)]
    pub datavols: Vec<DataVolume>,
}

#[derive(Debug, Deserialize)]
pub struct EnvEntry {
    #[serde(default)]
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DataVolume {
    pub name: String,
    pub size: String,
    pub mode: String,
    pub path: String,
    pub class: Option<String>,
}

/// Creates the Deployment behind an ad-hoc container, provisioning one PVC
/// per requested data volume first.
pub async fn create_container(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let request: CreateContainerRequest =
        serde_json::from_value(body).map_err(creation_failed)?;

    let creator = headers
        .get("kubeflow-userid")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let mut volumes = Vec::new();
    let mut mounts = Vec::new();
    for datavol in &request.datavols {
        tracing::info!("Creating PVC {} for custom container {}", datavol.name, request.name);
        let _created = state
            .gateway
            .create_persistent_volume_claim(&namespace, volume_claim(&namespace, datavol))
            .await
            .map_err(creation_failed)?;

        volumes.push(Volume {
            name: datavol.name.clone(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: datavol.name.clone(),
                ..PersistentVolumeClaimVolumeSource::default()
            }),
            ..Volume::default()
        });
        mounts.push(VolumeMount {
            name: datavol.name.clone(),
            mount_path: datavol.path.clone(),
            ..VolumeMount::default()
        });
    }

    tracing::info!("Creating custom container deployment {}", request.name);
    let deployment = container_deployment(&request, creator.as_deref(), volumes, mounts);
    let created = state
        .gateway
        .create_deployment(&namespace, deployment)
        .await
        .map_err(creation_failed)?;

    Ok(response::success("container", encode(&created)?))
}

/// Deletes the Deployment behind an ad-hoc container.
pub async fn delete_container(
    State(state): State<AppState>,
    Path((namespace, container_name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state
        .gateway
        .delete_deployment(&namespace, &container_name)
        .await
        .map_err(|err| ApiError::internal(format!("Container deletion failed: {err}")))?;

    Ok(response::success("container", json!({ "message": "Container deleted" })))
}

fn creation_failed(detail: impl std::fmt::Display) -> ApiError {
    ApiError::internal(format!("Container creation failed: {detail}"))
}

fn container_deployment(
    request: &CreateContainerRequest,
    creator: Option<&str>,
    volumes: Vec<Volume>,
    mounts: Vec<VolumeMount>,
) -> Deployment {
    let command: Vec<String> = request.command.split_whitespace().map(str::to_string).collect();
    let env: Vec<EnvVar> = request
        .envs
        .iter()
        .filter(|entry| !entry.name.is_empty())
        .map(|entry| EnvVar {
            name: entry.name.clone(),
            value: entry.value.clone(),
            ..EnvVar::default()
        })
        .collect();

    let container = Container {
        name: request.name.clone(),
        image: Some(request.image.clone()),
        command: (!command.is_empty()).then_some(command),
        ports: Some(
            request
                .ports
                .iter()
                .map(|&container_port| ContainerPort {
                    container_port,
                    ..ContainerPort::default()
                })
                .collect(),
        ),
        resources: Some(ResourceRequirements {
            requests: Some(request.resources.clone()),
            limits: Some(request.resources.clone()),
            ..ResourceRequirements::default()
        }),
        env: (!env.is_empty()).then_some(env),
        volume_mounts: (!mounts.is_empty()).then_some(mounts),
        ..Container::default()
    };

    let template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(BTreeMap::from([
                (k8s::labels::APP.to_string(), request.name.clone()),
                (k8s::labels::CONTAINER_TYPE.to_string(), k8s::labels::CUSTOM_CONTAINER.to_string()),
                (k8s::labels::NOTEBOOK_NAME.to_string(), request.name.clone()),
            ])),
            ..ObjectMeta::default()
        }),
        spec: Some(PodSpec {
            scheduler_name: Some(consts::CUSTOM_CONTAINER_SCHEDULER.to_string()),
            containers: vec![container],
            restart_policy: Some("Always".to_string()),
            volumes: (!volumes.is_empty()).then_some(volumes),
            ..PodSpec::default()
        }),
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(request.name.clone()),
            labels: Some(BTreeMap::from([
                (k8s::labels::CONTAINER_TYPE.to_string(), k8s::labels::CUSTOM_CONTAINER.to_string()),
                (k8s::labels::APP.to_string(), request.name.clone()),
            ])),
            annotations: creator.map(|creator| {
                BTreeMap::from([(k8s::annotations::CREATOR.to_string(), creator.to_string())])
            }),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    k8s::labels::APP.to_string(),
                    request.name.clone(),
                )])),
                ..LabelSelector::default()
            },
            template,
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

fn volume_claim(namespace: &str, datavol: &DataVolume) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(datavol.name.clone()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![datavol.mode.clone()]),
            storage_class_name: storage_class(datavol.class.as_deref()),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(datavol.size.clone()),
                )])),
                ..VolumeResourceRequirements::default()
            }),
            ..PersistentVolumeClaimSpec::default()
        }),
        ..PersistentVolumeClaim::default()
    }
}

/// Maps the storage-class field onto what the cluster should see: `{none}`
/// (or an absent field) leaves the cluster default in charge, `{empty}`
/// pins the claim to no class at all.
fn storage_class(class: Option<&str>) -> Option<String> {
    match class {
        None | Some("{none}") => None,
        Some("{empty}") => Some(String::new()),
        Some(class) => Some(class.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use k8s_openapi::{api::apps::v1::Deployment, apimachinery::pkg::apis::meta::v1::ObjectMeta};
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::storage_class;
    use crate::{
        config::Config,
        gateway::mock::MockGateway,
        server::{self, AppState},
    };

    fn state_over(gateway: Arc<MockGateway>) -> AppState {
        AppState::new(gateway, Config::default(), CancellationToken::new())
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = server::router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post_json(uri: &str, creator: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder =
            Request::builder().method("POST").uri(uri).header("content-type", "application/json");
        if let Some(creator) = creator {
            builder = builder.header("kubeflow-userid", creator);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn delete(uri: &str) -> Request<Body> {
        Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_create_container_provisions_claims_and_deployment() {
        let mock = Arc::new(MockGateway::default());
        let body = json!({
            "name": "trainer",
            "image": "registry.local/tools/trainer:2.1",
            "command": "python train.py",
            "ports": [8080],
            "resources": { "cpu": "500m", "memory": "1Gi" },
            "envs": [
                { "name": "MODE", "value": "batch" },
                { "name": "", "value": "dropped" },
            ],
            "datavols": [{
                "name": "scratch",
                "size": "10Gi",
                "mode": "ReadWriteOnce",
                "path": "/scratch",
                "class": "{none}",
            }],
        });

        let (status, response) = send(
            state_over(Arc::clone(&mock)),
            post_json("/api/namespaces/alice/containers", Some("mary@example.com"), &body),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["success"], true);
        assert_eq!(response["container"]["metadata"]["name"], "trainer");

        let claims = mock.claims.lock().unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].metadata.name.as_deref(), Some("scratch"));
        let claim_spec = claims[0].spec.as_ref().unwrap();
        assert_eq!(claim_spec.access_modes, Some(vec!["ReadWriteOnce".to_string()]));
        assert_eq!(claim_spec.storage_class_name, None);

        let deployments = mock.deployments.lock().unwrap();
        let deployment = deployments.get("alice/trainer").unwrap();
        let annotations = deployment.metadata.annotations.as_ref().unwrap();
        assert_eq!(
            annotations.get("notebooks.kubeflow.org/creator"),
            Some(&"mary@example.com".to_string())
        );

        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(
            spec.selector.match_labels.as_ref().unwrap().get("app"),
            Some(&"trainer".to_string())
        );

        let template_labels = spec.template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert_eq!(template_labels.get("container-type"), Some(&"custom-container".to_string()));
        assert_eq!(template_labels.get("notebook-name"), Some(&"trainer".to_string()));

        let pod_spec = spec.template.spec.as_ref().unwrap();
        assert_eq!(pod_spec.scheduler_name.as_deref(), Some("reservation-scheduler"));
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Always"));
        assert_eq!(pod_spec.volumes.as_ref().unwrap().len(), 1);

        let container = &pod_spec.containers[0];
        assert_eq!(container.command, Some(vec!["python".to_string(), "train.py".to_string()]));
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 8080);
        let resources = container.resources.as_ref().unwrap();
        assert_eq!(resources.requests, resources.limits);
        let env = container.env.as_ref().unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].name, "MODE");
        assert_eq!(env[0].value.as_deref(), Some("batch"));
        let mounts = container.volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].name, "scratch");
        assert_eq!(mounts[0].mount_path, "/scratch");
    }

    #[tokio::test]
    async fn test_create_container_without_creator_header() {
        let mock = Arc::new(MockGateway::default());
        let body = json!({ "name": "probe", "image": "busybox:1.36" });

        let (status, _response) = send(
            state_over(Arc::clone(&mock)),
            post_json("/api/namespaces/alice/containers", None, &body),
        )
        .await;

        assert_eq!(status, StatusCode::OK);

        let deployments = mock.deployments.lock().unwrap();
        let deployment = deployments.get("alice/probe").unwrap();
        assert_eq!(deployment.metadata.annotations, None);

        let container = &deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0];
        assert_eq!(container.command, None);
        assert_eq!(container.env, None);
        assert_eq!(container.volume_mounts, None);
        assert!(mock.claims.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_container_rejects_malformed_body() {
        let mock = Arc::new(MockGateway::default());
        let body = json!({ "name": "trainer" });

        let (status, response) = send(
            state_over(Arc::clone(&mock)),
            post_json("/api/namespaces/alice/containers", None, &body),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response["success"], false);
        assert!(
            response["log"].as_str().unwrap().starts_with("Container creation failed:"),
            "unexpected message: {}",
            response["log"]
        );
        assert!(mock.deployments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_container_surfaces_cluster_failure() {
        let mock = Arc::new(MockGateway { fail_create: vec!["deployments"], ..MockGateway::default() });
        let body = json!({ "name": "trainer", "image": "busybox:1.36" });

        let (status, response) = send(
            state_over(Arc::clone(&mock)),
            post_json("/api/namespaces/alice/containers", None, &body),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            response["log"]
                .as_str()
                .unwrap()
                .starts_with("Container creation failed: Failed to create Deployment"),
            "unexpected message: {}",
            response["log"]
        );
    }

    #[tokio::test]
    async fn test_delete_container_acknowledges() {
        let mock = Arc::new(MockGateway::default());
        {
            let trainer = Deployment {
                metadata: ObjectMeta {
                    name: Some("trainer".to_string()),
                    namespace: Some("alice".to_string()),
                    ..ObjectMeta::default()
                },
                ..Deployment::default()
            };
            let _previous =
                mock.deployments.lock().unwrap().insert("alice/trainer".to_string(), trainer);
        }

        let (status, response) =
            send(state_over(Arc::clone(&mock)), delete("/api/namespaces/alice/containers/trainer"))
                .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["container"], json!({ "message": "Container deleted" }));
        assert!(mock.deployments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_container_reports_failure() {
        let mock = Arc::new(MockGateway::default());

        let (status, response) =
            send(state_over(Arc::clone(&mock)), delete("/api/namespaces/alice/containers/trainer"))
                .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response["log"],
            "Container deletion failed: Deployment trainer not found in namespace alice"
        );
    }

    #[test]
    fn test_storage_class_sentinels() {
        assert_eq!(storage_class(None), None);
        assert_eq!(storage_class(Some("{none}")), None);
        assert_eq!(storage_class(Some("{empty}")), Some(String::new()));
        assert_eq!(storage_class(Some("standard")), Some("standard".to_string()));
    }
}
