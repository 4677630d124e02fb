//! Cluster object gateway.
//!
//! Every Kubernetes read and write issued by the server goes through the
//! [`ClusterGateway`] trait, so the provisioning logic stays independent of a
//! live cluster. [`KubeGateway`] is the production implementation; it checks
//! a `SelfSubjectAccessReview` before each operation and translates raw API
//! failures into [`Error`] variants the callers can match on.

pub mod error;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use dendrite_base::consts::k8s::kinds::CustomKind;
use futures::future;
use k8s_openapi::api::{
    apps::v1::Deployment,
    authorization::v1::{ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec},
    core::v1::{Node, PersistentVolumeClaim, Pod, Service},
};
use kube::{
    Api,
    api::{ApiResource, AttachParams, DeleteParams, DynamicObject, ListParams, LogParams, PostParams},
};
use snafu::ResultExt;
use tokio::io::{AsyncRead, AsyncReadExt};

pub use self::error::Error;

/// Attributes submitted with one authorization review.
#[derive(Clone, Copy, Debug)]
pub struct AccessReview<'a> {
    pub verb: &'static str,
    pub group: &'a str,
    pub version: &'a str,
    pub resource: &'a str,
    pub namespace: Option<&'a str>,
    pub subresource: Option<&'a str>,
}

impl<'a> AccessReview<'a> {
    pub const fn core(verb: &'static str, resource: &'a str, namespace: &'a str) -> Self {
        Self { verb, group: "", version: "v1", resource, namespace: Some(namespace), subresource: None }
    }

    pub const fn core_subresource(
        verb: &'static str,
        resource: &'a str,
        subresource: &'a str,
        namespace: &'a str,
    ) -> Self {
        Self { verb, group: "", version: "v1", resource, namespace: Some(namespace), subresource: Some(subresource) }
    }

    pub const fn cluster(verb: &'static str, resource: &'a str) -> Self {
        Self { verb, group: "", version: "v1", resource, namespace: None, subresource: None }
    }

    pub const fn apps(verb: &'static str, resource: &'a str, namespace: &'a str) -> Self {
        Self { verb, group: "apps", version: "v1", resource, namespace: Some(namespace), subresource: None }
    }

    pub const fn custom(verb: &'static str, kind: CustomKind, namespace: &'a str) -> Self {
        Self {
            verb,
            group: kind.group,
            version: kind.version,
            resource: kind.plural,
            namespace: Some(namespace),
            subresource: None,
        }
    }
}

/// Narrow view of the Kubernetes API surface the server needs.
///
/// Built-in kinds get dedicated methods; everything served through a custom
/// resource definition goes through the `*_custom` methods with a
/// [`CustomKind`] descriptor and an untyped manifest.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Lists pods, optionally narrowed by a label selector.
    async fn list_pods(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Pod>, Error>;

    /// Fetches the log of one container in a pod.
    async fn pod_logs(&self, namespace: &str, pod_name: &str, container: &str) -> Result<String, Error>;

    /// Runs a command inside a container and returns the merged output of
    /// both standard streams, trimmed.
    async fn exec(
        &self,
        namespace: &str,
        pod_name: &str,
        container: &str,
        command: &[String],
    ) -> Result<String, Error>;

    async fn create_service(&self, namespace: &str, service: Service) -> Result<Service, Error>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, Error>;

    async fn get_node(&self, name: &str) -> Result<Node, Error>;

    async fn list_nodes(&self) -> Result<Vec<Node>, Error>;

    async fn list_persistent_volume_claims(&self, namespace: &str) -> Result<Vec<PersistentVolumeClaim>, Error>;

    async fn create_persistent_volume_claim(
        &self,
        namespace: &str,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, Error>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, Error>;

    async fn create_deployment(&self, namespace: &str, deployment: Deployment) -> Result<Deployment, Error>;

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Creates a custom object from a JSON manifest carrying `apiVersion`,
    /// `kind` and `metadata`.
    async fn create_custom(
        &self,
        kind: CustomKind,
        namespace: &str,
        manifest: serde_json::Value,
    ) -> Result<DynamicObject, Error>;

    async fn get_custom(&self, kind: CustomKind, namespace: &str, name: &str) -> Result<DynamicObject, Error>;

    async fn list_custom(&self, kind: CustomKind, namespace: &str) -> Result<Vec<DynamicObject>, Error>;

    async fn delete_custom(&self, kind: CustomKind, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Gateway backed by a live [`kube::Client`].
#[derive(Clone)]
pub struct KubeGateway {
    client: kube::Client,
}

impl KubeGateway {
    #[must_use]
    pub const fn new(client: kube::Client) -> Self { Self { client } }

    /// Submits a `SelfSubjectAccessReview` and fails with
    /// [`Error::Forbidden`] unless the cluster explicitly allows the
    /// operation.
    async fn ensure_authorized(&self, review: AccessReview<'_>) -> Result<(), Error> {
        let AccessReview { verb, group, version, resource, namespace, subresource } = review;
        let access_review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    verb: Some(verb.to_string()),
                    group: (!group.is_empty()).then(|| group.to_string()),
                    version: Some(version.to_string()),
                    resource: Some(resource.to_string()),
                    namespace: namespace.map(str::to_string),
                    subresource: subresource.map(str::to_string),
                    ..ResourceAttributes::default()
                }),
                ..SelfSubjectAccessReviewSpec::default()
            },
            ..SelfSubjectAccessReview::default()
        };

        let response = Api::<SelfSubjectAccessReview>::all(self.client.clone())
            .create(&PostParams::default(), &access_review)
            .await
            .context(error::AuthorizationReviewSnafu)?;

        if response.status.is_some_and(|status| status.allowed) {
            Ok(())
        } else {
            error::ForbiddenSnafu {
                verb,
                resource: resource.to_string(),
                namespace: namespace.unwrap_or_default().to_string(),
            }
            .fail()
        }
    }

    fn custom_api(&self, kind: CustomKind, namespace: &str) -> Api<DynamicObject> {
        let resource = ApiResource {
            group: kind.group.to_string(),
            version: kind.version.to_string(),
            api_version: kind.api_version(),
            kind: kind.kind.to_string(),
            plural: kind.plural.to_string(),
        };
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn list_pods(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Pod>, Error> {
        self.ensure_authorized(AccessReview::core("list", "pods", namespace)).await?;

        let params =
            label_selector.map_or_else(ListParams::default, |selector| ListParams::default().labels(selector));
        let pods = Api::<Pod>::namespaced(self.client.clone(), namespace)
            .list(&params)
            .await
            .context(error::ApiSnafu { verb: "list", kind: "Pod", namespace })?;
        Ok(pods.items)
    }

    async fn pod_logs(&self, namespace: &str, pod_name: &str, container: &str) -> Result<String, Error> {
        self.ensure_authorized(AccessReview::core_subresource("get", "pods", "log", namespace)).await?;

        let params = LogParams { container: Some(container.to_string()), ..LogParams::default() };
        Api::<Pod>::namespaced(self.client.clone(), namespace)
            .logs(pod_name, &params)
            .await
            .map_err(|source| Error::classify("get", "Pod", namespace, pod_name, source))
    }

    async fn exec(
        &self,
        namespace: &str,
        pod_name: &str,
        container: &str,
        command: &[String],
    ) -> Result<String, Error> {
        self.ensure_authorized(AccessReview::core_subresource("create", "pods", "exec", namespace)).await?;

        let params = AttachParams { container: Some(container.to_string()), ..AttachParams::default() };
        let mut attached = Api::<Pod>::namespaced(self.client.clone(), namespace)
            .exec(pod_name, command.to_vec(), &params)
            .await
            .context(error::ExecSnafu { namespace, pod_name })?;

        let stdout_pipe = attached.stdout();
        let stderr_pipe = attached.stderr();
        let (stdout, stderr) = future::join(read_stream(stdout_pipe), read_stream(stderr_pipe)).await;
        let _unused = attached.join().await;

        let stdout = stdout.context(error::ExecStreamSnafu { namespace, pod_name })?;
        let stderr = stderr.context(error::ExecStreamSnafu { namespace, pod_name })?;
        Ok(format!("{stdout}{stderr}").trim().to_string())
    }

    async fn create_service(&self, namespace: &str, service: Service) -> Result<Service, Error> {
        self.ensure_authorized(AccessReview::core("create", "services", namespace)).await?;

        let name = service.metadata.name.clone().unwrap_or_default();
        Api::<Service>::namespaced(self.client.clone(), namespace)
            .create(&PostParams::default(), &service)
            .await
            .map_err(|source| Error::classify("create", "Service", namespace, &name, source))
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, Error> {
        self.ensure_authorized(AccessReview::core("get", "services", namespace)).await?;

        Api::<Service>::namespaced(self.client.clone(), namespace)
            .get(name)
            .await
            .map_err(|source| Error::classify("get", "Service", namespace, name, source))
    }

    async fn get_node(&self, name: &str) -> Result<Node, Error> {
        self.ensure_authorized(AccessReview::cluster("get", "nodes")).await?;

        Api::<Node>::all(self.client.clone())
            .get(name)
            .await
            .map_err(|source| Error::classify("get", "Node", "", name, source))
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, Error> {
        self.ensure_authorized(AccessReview::cluster("list", "nodes")).await?;

        let nodes = Api::<Node>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .context(error::ApiSnafu { verb: "list", kind: "Node", namespace: "" })?;
        Ok(nodes.items)
    }

    async fn list_persistent_volume_claims(&self, namespace: &str) -> Result<Vec<PersistentVolumeClaim>, Error> {
        self.ensure_authorized(AccessReview::core("list", "persistentvolumeclaims", namespace)).await?;

        let claims = Api::<PersistentVolumeClaim>::namespaced(self.client.clone(), namespace)
            .list(&ListParams::default())
            .await
            .context(error::ApiSnafu { verb: "list", kind: "PersistentVolumeClaim", namespace })?;
        Ok(claims.items)
    }

    async fn create_persistent_volume_claim(
        &self,
        namespace: &str,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, Error> {
        self.ensure_authorized(AccessReview::core("create", "persistentvolumeclaims", namespace)).await?;

        let name = claim.metadata.name.clone().unwrap_or_default();
        Api::<PersistentVolumeClaim>::namespaced(self.client.clone(), namespace)
            .create(&PostParams::default(), &claim)
            .await
            .map_err(|source| Error::classify("create", "PersistentVolumeClaim", namespace, &name, source))
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, Error> {
        self.ensure_authorized(AccessReview::apps("list", "deployments", namespace)).await?;

        let deployments = Api::<Deployment>::namespaced(self.client.clone(), namespace)
            .list(&ListParams::default())
            .await
            .context(error::ApiSnafu { verb: "list", kind: "Deployment", namespace })?;
        Ok(deployments.items)
    }

    async fn create_deployment(&self, namespace: &str, deployment: Deployment) -> Result<Deployment, Error> {
        self.ensure_authorized(AccessReview::apps("create", "deployments", namespace)).await?;

        let name = deployment.metadata.name.clone().unwrap_or_default();
        Api::<Deployment>::namespaced(self.client.clone(), namespace)
            .create(&PostParams::default(), &deployment)
            .await
            .map_err(|source| Error::classify("create", "Deployment", namespace, &name, source))
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.ensure_authorized(AccessReview::apps("delete", "deployments", namespace)).await?;

        let _status = Api::<Deployment>::namespaced(self.client.clone(), namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|source| Error::classify("delete", "Deployment", namespace, name, source))?;
        Ok(())
    }

    async fn create_custom(
        &self,
        kind: CustomKind,
        namespace: &str,
        manifest: serde_json::Value,
    ) -> Result<DynamicObject, Error> {
        self.ensure_authorized(AccessReview::custom("create", kind, namespace)).await?;

        let object: DynamicObject =
            serde_json::from_value(manifest).context(error::EncodeManifestSnafu { kind: kind.kind })?;
        let name = object.metadata.name.clone().unwrap_or_default();
        self.custom_api(kind, namespace)
            .create(&PostParams::default(), &object)
            .await
            .map_err(|source| Error::classify("create", kind.kind, namespace, &name, source))
    }

    async fn get_custom(&self, kind: CustomKind, namespace: &str, name: &str) -> Result<DynamicObject, Error> {
        self.ensure_authorized(AccessReview::custom("get", kind, namespace)).await?;

        self.custom_api(kind, namespace)
            .get(name)
            .await
            .map_err(|source| Error::classify("get", kind.kind, namespace, name, source))
    }

    async fn list_custom(&self, kind: CustomKind, namespace: &str) -> Result<Vec<DynamicObject>, Error> {
        self.ensure_authorized(AccessReview::custom("list", kind, namespace)).await?;

        let objects = self
            .custom_api(kind, namespace)
            .list(&ListParams::default())
            .await
            .context(error::ApiSnafu { verb: "list", kind: kind.kind, namespace })?;
        Ok(objects.items)
    }

    async fn delete_custom(&self, kind: CustomKind, namespace: &str, name: &str) -> Result<(), Error> {
        self.ensure_authorized(AccessReview::custom("delete", kind, namespace)).await?;

        let _status = self
            .custom_api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|source| Error::classify("delete", kind.kind, namespace, name, source))?;
        Ok(())
    }
}

async fn read_stream<R>(stream: Option<R>) -> Result<String, std::io::Error>
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else { return Ok(String::new()) };
    let mut buffer = Vec::new();
    let _bytes = stream.read_to_end(&mut buffer).await?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
