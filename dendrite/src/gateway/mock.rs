//! In-memory [`ClusterGateway`] used by unit tests.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use dendrite_base::consts::k8s::{self, kinds::CustomKind};
use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{Node, NodeAddress, NodeStatus, PersistentVolumeClaim, Pod, Service},
    },
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time},
    jiff::Timestamp,
};
use kube::{
    api::DynamicObject,
    core::{Status, response::StatusSummary},
};

use super::{ClusterGateway, Error};

/// Makes the backing-service label appear on stored cloudshell objects from
/// the `visible_after_reads`-th read onward.
pub struct BackingServicePlan {
    pub visible_after_reads: u32,
    pub service_name: String,
}

/// Gateway whose cluster is a set of in-memory stores.
///
/// Fixture fields are filled in before the gateway is shared; the `Mutex`
/// fields hold the objects "created" during a test and the read counters the
/// assertions inspect.
#[derive(Default)]
pub struct MockGateway {
    pub pods: Vec<Pod>,
    pub nodes: Vec<Node>,
    pub exec_responses: HashMap<String, String>,
    pub pod_log: String,
    pub assigned_node_port: Option<i32>,
    pub backing_service: Option<BackingServicePlan>,
    pub fail_create: Vec<&'static str>,
    pub fail_delete: Vec<&'static str>,

    pub services: Mutex<HashMap<String, Service>>,
    pub custom_objects: Mutex<HashMap<String, DynamicObject>>,
    pub deployments: Mutex<HashMap<String, Deployment>>,
    pub claims: Mutex<Vec<PersistentVolumeClaim>>,
    pub cloudshell_reads: Mutex<u32>,
}

impl MockGateway {
    fn injected_failure(verb: &'static str, kind: &'static str, namespace: &str) -> Error {
        Error::Api {
            verb,
            kind,
            namespace: namespace.to_string(),
            source: Box::new(kube::Error::Api(Box::new(Status {
                status: Some(StatusSummary::Failure),
                message: "injected failure".to_string(),
                reason: "InternalError".to_string(),
                code: 500,
                metadata: None,
                details: None,
            }))),
        }
    }

    fn custom_key(kind: CustomKind, namespace: &str, name: &str) -> String {
        format!("{}/{namespace}/{name}", kind.plural)
    }
}

fn selector_matches(selector: &str, pod: &Pod) -> bool {
    selector.split(',').all(|pair| match pair.split_once('=') {
        Some((key, value)) => pod
            .metadata
            .labels
            .as_ref()
            .is_some_and(|labels| labels.get(key).is_some_and(|found| found == value)),
        None => true,
    })
}

#[async_trait]
impl ClusterGateway for MockGateway {
    async fn list_pods(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Pod>, Error> {
        let pods = self
            .pods
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| label_selector.is_none_or(|selector| selector_matches(selector, pod)))
            .cloned()
            .collect();
        Ok(pods)
    }

    async fn pod_logs(&self, namespace: &str, pod_name: &str, _container: &str) -> Result<String, Error> {
        if self.pods.iter().any(|pod| pod.metadata.name.as_deref() == Some(pod_name)) {
            Ok(self.pod_log.clone())
        } else {
            Err(Error::NotFound {
                kind: "Pod",
                namespace: namespace.to_string(),
                name: pod_name.to_string(),
            })
        }
    }

    async fn exec(
        &self,
        namespace: &str,
        pod_name: &str,
        _container: &str,
        _command: &[String],
    ) -> Result<String, Error> {
        self.exec_responses.get(pod_name).cloned().ok_or_else(|| Error::Exec {
            namespace: namespace.to_string(),
            pod_name: pod_name.to_string(),
            source: Box::new(kube::Error::Api(Box::new(Status {
                status: Some(StatusSummary::Failure),
                message: "no exec response configured".to_string(),
                reason: "InternalError".to_string(),
                code: 500,
                metadata: None,
                details: None,
            }))),
        })
    }

    async fn create_service(&self, namespace: &str, service: Service) -> Result<Service, Error> {
        if self.fail_create.contains(&"services") {
            return Err(Self::injected_failure("create", "Service", namespace));
        }

        let name = service.metadata.name.clone().unwrap_or_default();
        let key = format!("{namespace}/{name}");
        let mut services = self.services.lock().unwrap();
        if services.contains_key(&key) {
            return Err(Error::AlreadyExists { kind: "Service", namespace: namespace.to_string(), name });
        }

        let mut stored = service;
        let is_node_port =
            stored.spec.as_ref().and_then(|spec| spec.type_.as_deref()) == Some("NodePort");
        if is_node_port && let Some(node_port) = self.assigned_node_port {
            if let Some(ports) = stored.spec.as_mut().and_then(|spec| spec.ports.as_mut())
                && let Some(port) = ports.first_mut()
            {
                port.node_port = Some(node_port);
            }
        }
        let _previous = services.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, Error> {
        self.services.lock().unwrap().get(&format!("{namespace}/{name}")).cloned().ok_or_else(|| {
            Error::NotFound { kind: "Service", namespace: namespace.to_string(), name: name.to_string() }
        })
    }

    async fn get_node(&self, name: &str) -> Result<Node, Error> {
        self.nodes
            .iter()
            .find(|node| node.metadata.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "Node",
                namespace: String::new(),
                name: name.to_string(),
            })
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, Error> { Ok(self.nodes.clone()) }

    async fn list_persistent_volume_claims(&self, namespace: &str) -> Result<Vec<PersistentVolumeClaim>, Error> {
        let claims = self
            .claims
            .lock()
            .unwrap()
            .iter()
            .filter(|claim| claim.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect();
        Ok(claims)
    }

    async fn create_persistent_volume_claim(
        &self,
        namespace: &str,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, Error> {
        if self.fail_create.contains(&"persistentvolumeclaims") {
            return Err(Self::injected_failure("create", "PersistentVolumeClaim", namespace));
        }
        self.claims.lock().unwrap().push(claim.clone());
        Ok(claim)
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, Error> {
        let mut deployments: Vec<_> = self
            .deployments
            .lock()
            .unwrap()
            .values()
            .filter(|deployment| deployment.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect();
        deployments.sort_by_key(|deployment| deployment.metadata.name.clone());
        Ok(deployments)
    }

    async fn create_deployment(&self, namespace: &str, deployment: Deployment) -> Result<Deployment, Error> {
        if self.fail_create.contains(&"deployments") {
            return Err(Self::injected_failure("create", "Deployment", namespace));
        }

        let name = deployment.metadata.name.clone().unwrap_or_default();
        let key = format!("{namespace}/{name}");
        let mut deployments = self.deployments.lock().unwrap();
        if deployments.contains_key(&key) {
            return Err(Error::AlreadyExists { kind: "Deployment", namespace: namespace.to_string(), name });
        }

        // The API server stamps the namespace; handlers leave it to the path.
        let mut stored = deployment;
        if stored.metadata.namespace.is_none() {
            stored.metadata.namespace = Some(namespace.to_string());
        }
        let _previous = deployments.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), Error> {
        if self.fail_delete.contains(&"deployments") {
            return Err(Self::injected_failure("delete", "Deployment", namespace));
        }

        self.deployments.lock().unwrap().remove(&format!("{namespace}/{name}")).map(|_| ()).ok_or_else(
            || Error::NotFound { kind: "Deployment", namespace: namespace.to_string(), name: name.to_string() },
        )
    }

    async fn create_custom(
        &self,
        kind: CustomKind,
        namespace: &str,
        manifest: serde_json::Value,
    ) -> Result<DynamicObject, Error> {
        if self.fail_create.contains(&kind.plural) {
            return Err(Self::injected_failure("create", kind.kind, namespace));
        }

        let object: DynamicObject = serde_json::from_value(manifest)
            .map_err(|source| Error::EncodeManifest { kind: kind.kind, source })?;
        let name = object.metadata.name.clone().unwrap_or_default();
        let key = Self::custom_key(kind, namespace, &name);
        let mut objects = self.custom_objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(Error::AlreadyExists { kind: kind.kind, namespace: namespace.to_string(), name });
        }
        let _previous = objects.insert(key, object.clone());
        Ok(object)
    }

    async fn get_custom(&self, kind: CustomKind, namespace: &str, name: &str) -> Result<DynamicObject, Error> {
        let reads = if kind.plural == k8s::kinds::CLOUDSHELL.plural {
            let mut reads = self.cloudshell_reads.lock().unwrap();
            *reads += 1;
            *reads
        } else {
            0
        };

        let key = Self::custom_key(kind, namespace, name);
        let mut object =
            self.custom_objects.lock().unwrap().get(&key).cloned().ok_or_else(|| Error::NotFound {
                kind: kind.kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        if kind.plural == k8s::kinds::CLOUDSHELL.plural
            && let Some(plan) = &self.backing_service
            && reads >= plan.visible_after_reads
        {
            let _previous = object
                .metadata
                .labels
                .get_or_insert_with(Default::default)
                .insert(k8s::labels::CLOUDSHELL_BACKING_SERVICE.to_string(), plan.service_name.clone());
        }
        Ok(object)
    }

    async fn list_custom(&self, kind: CustomKind, namespace: &str) -> Result<Vec<DynamicObject>, Error> {
        let prefix = format!("{}/{namespace}/", kind.plural);
        let mut objects: Vec<_> = self
            .custom_objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, object)| object.clone())
            .collect();
        objects.sort_by_key(|object| object.metadata.name.clone());
        Ok(objects)
    }

    async fn delete_custom(&self, kind: CustomKind, namespace: &str, name: &str) -> Result<(), Error> {
        if self.fail_delete.contains(&kind.plural) {
            return Err(Self::injected_failure("delete", kind.kind, namespace));
        }

        let key = Self::custom_key(kind, namespace, name);
        self.custom_objects.lock().unwrap().remove(&key).map(|_| ()).ok_or_else(|| Error::NotFound {
            kind: kind.kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

pub fn pod_named(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            labels: (!labels.is_empty()).then(|| {
                labels.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect()
            }),
            ..ObjectMeta::default()
        },
        ..Pod::default()
    }
}

pub fn pod_created_at(namespace: &str, name: &str, labels: &[(&str, &str)], timestamp: i64) -> Pod {
    let mut pod = pod_named(namespace, name, labels);
    pod.metadata.creation_timestamp = Timestamp::from_second(timestamp).ok().map(Time);
    pod
}

pub fn node_with_internal_ip(name: &str, address: &str) -> Node {
    Node {
        metadata: ObjectMeta { name: Some(name.to_string()), ..ObjectMeta::default() },
        status: Some(NodeStatus {
            addresses: Some(vec![NodeAddress {
                type_: "InternalIP".to_string(),
                address: address.to_string(),
            }]),
            ..NodeStatus::default()
        }),
        ..Node::default()
    }
}
