//! On-demand exposure of workload ports.
//!
//! An exposure is a Service plus an Istio `AuthorizationPolicy` scoped to the
//! exposed port. Both carry names derived from the pod name and port, so
//! repeating a request converges on the objects created the first time
//! instead of piling up duplicates. Objects are owned by whatever owns the
//! pod and disappear with it through garbage collection.

pub mod error;

use std::collections::BTreeMap;

use dendrite_base::consts::k8s::kinds;
use k8s_openapi::{
    api::core::v1::{Pod, Service, ServicePort, ServiceSpec},
    apimachinery::pkg::{apis::meta::v1::OwnerReference, util::intstr::IntOrString},
};
use kube::api::ObjectMeta;
use serde_json::json;
use snafu::ResultExt;

use crate::{
    ext::PodExt,
    gateway::{self, ClusterGateway},
};

pub use self::error::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExposureKind {
    NodePort,
    ClusterIp,
}

impl ExposureKind {
    #[must_use]
    pub const fn service_type(self) -> &'static str {
        match self {
            Self::NodePort => "NodePort",
            Self::ClusterIp => "ClusterIP",
        }
    }
}

/// Handle to a provisioned exposure. `node_port` is only present for
/// [`ExposureKind::NodePort`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExposedService {
    pub name: String,
    pub node_port: Option<i32>,
}

#[must_use]
pub fn service_name(kind: ExposureKind, pod_name: &str, port: i32) -> String {
    format!("{}-service-{pod_name}-{port}", kind.service_type()).to_lowercase()
}

#[must_use]
pub fn policy_name(kind: ExposureKind, pod_name: &str, port: i32) -> String {
    format!("allow-{}-{pod_name}-{port}", kind.service_type()).to_lowercase()
}

/// Exposes `port` of the pod through a Service of the requested kind.
///
/// An existing service with the derived name is treated as the result of an
/// earlier, identical request. The authorization policy is best effort; a
/// missing node port on a `NodePort` service is not.
///
/// # Errors
///
/// Fails when the service cannot be created for a reason other than already
/// existing, when it cannot be read back, or when the cluster never assigned
/// a node port to it.
pub async fn expose(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    pod: &Pod,
    selector: &BTreeMap<String, String>,
    port: i32,
    kind: ExposureKind,
) -> Result<ExposedService, Error> {
    let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
    let name = service_name(kind, pod_name, port);
    let owner_references = pod.owner_references();

    let service = Service {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            owner_references: (!owner_references.is_empty()).then(|| owner_references.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector.clone()),
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..ServicePort::default()
            }]),
            type_: Some(kind.service_type().to_string()),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    };

    match gateway.create_service(namespace, service).await {
        Ok(_) => tracing::info!("Created {} service {name} in namespace {namespace}", kind.service_type()),
        Err(gateway::Error::AlreadyExists { .. }) => {
            tracing::info!("{} service {name} already exists in namespace {namespace}", kind.service_type());
        }
        Err(source) => {
            return Err(source).context(error::CreateServiceSnafu { namespace, service_name: name });
        }
    }

    allow_port(gateway, namespace, kind, pod_name, &owner_references, selector, port).await;

    let node_port = match kind {
        ExposureKind::NodePort => {
            let created = gateway
                .get_service(namespace, &name)
                .await
                .with_context(|_| error::ReadBackServiceSnafu { namespace, service_name: name.clone() })?;
            let assigned = created
                .spec
                .and_then(|spec| spec.ports)
                .into_iter()
                .flatten()
                .find_map(|service_port| service_port.node_port);
            let Some(assigned) = assigned else {
                return error::PortUnassignedSnafu { namespace, service_name: name }.fail();
            };
            Some(assigned)
        }
        ExposureKind::ClusterIp => None,
    };

    Ok(ExposedService { name, node_port })
}

/// Publishes the `AuthorizationPolicy` admitting traffic to the exposed
/// port. Failures are logged and swallowed so an unhealthy policy webhook
/// cannot take the whole exposure down.
async fn allow_port(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    kind: ExposureKind,
    pod_name: &str,
    owner_references: &[OwnerReference],
    selector: &BTreeMap<String, String>,
    port: i32,
) {
    let name = policy_name(kind, pod_name, port);
    let manifest = json!({
        "apiVersion": kinds::AUTHORIZATION_POLICY.api_version(),
        "kind": kinds::AUTHORIZATION_POLICY.kind,
        "metadata": {
            "name": name,
            "namespace": namespace,
            "ownerReferences": owner_references,
        },
        "spec": {
            "selector": { "matchLabels": selector },
            "action": "ALLOW",
            "rules": [{
                "to": [{
                    "operation": { "ports": [port.to_string()] }
                }]
            }]
        },
    });

    match gateway.create_custom(kinds::AUTHORIZATION_POLICY, namespace, manifest).await {
        Ok(_) => tracing::info!("Created authorization policy {name} in namespace {namespace}"),
        Err(gateway::Error::AlreadyExists { .. }) => {
            tracing::info!("Authorization policy {name} already exists in namespace {namespace}");
        }
        Err(err) => {
            tracing::error!("Failed to create authorization policy {name} in namespace {namespace}, error: {err}");
        }
    }
}
