//! Publishes HTTP routes through the cluster's Istio gateway.
//!
//! A route is a `VirtualService` binding one URI prefix on the shared
//! gateway to one backing service. Route names derive from the service they
//! front, so publishing is idempotent the same way exposure is.

pub mod error;

use dendrite_base::consts::k8s::{self, kinds};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::json;
use snafu::ResultExt;

use crate::gateway::{self, ClusterGateway};

pub use self::error::Error;

#[must_use]
pub fn route_name(service_name: &str) -> String {
    format!("cloudshell-virtualservice-{service_name}").to_lowercase()
}

/// Routes `prefix` on the gateway to the given service port, stripping the
/// prefix on the way through. Returns the route name.
///
/// # Errors
///
/// Fails when the virtual service cannot be created; an already existing
/// route counts as published.
pub async fn publish(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    service_name: &str,
    owner_references: &[OwnerReference],
    gateway_name: &str,
    prefix: &str,
    port: u16,
) -> Result<String, Error> {
    let name = route_name(service_name);
    let service_host = format!("{service_name}.{namespace}.{}", k8s::CLUSTER_DOMAIN);
    let manifest = json!({
        "apiVersion": kinds::VIRTUAL_SERVICE.api_version(),
        "kind": kinds::VIRTUAL_SERVICE.kind,
        "metadata": {
            "name": name,
            "namespace": namespace,
            "ownerReferences": owner_references,
        },
        "spec": {
            "hosts": ["*"],
            "gateways": [gateway_name],
            "http": [{
                "match": [{ "uri": { "prefix": prefix } }],
                "rewrite": { "uri": "/" },
                "route": [{
                    "destination": { "host": service_host, "port": { "number": port } }
                }]
            }]
        },
    });

    match gateway.create_custom(kinds::VIRTUAL_SERVICE, namespace, manifest).await {
        Ok(_) => {
            tracing::info!("Created virtual service {name} in namespace {namespace}");
            Ok(name)
        }
        Err(gateway::Error::AlreadyExists { .. }) => {
            tracing::info!("Virtual service {name} already exists in namespace {namespace}");
            Ok(name)
        }
        Err(source) => Err(source).context(error::CreateRouteSnafu { namespace, route_name: name }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::gateway::mock::MockGateway;

    #[test]
    fn test_route_name_is_derived_from_the_service() {
        assert_eq!(route_name("Svc1"), "cloudshell-virtualservice-svc1");
    }

    #[tokio::test]
    async fn test_publish_builds_the_expected_route() {
        let gateway = Arc::new(MockGateway::default());

        let name = publish(
            gateway.as_ref(),
            "alice",
            "clusterip-service-shell-0-7681",
            &[],
            "kubeflow/kubeflow-gateway",
            "/cloudtty/alice/shell/",
            7681,
        )
        .await
        .unwrap();

        assert_eq!(name, "cloudshell-virtualservice-clusterip-service-shell-0-7681");

        let routes = gateway.custom_objects.lock().unwrap();
        let route = &routes[&format!("virtualservices/alice/{name}")];
        let spec = &route.data["spec"];
        assert_eq!(spec["hosts"][0], "*");
        assert_eq!(spec["gateways"][0], "kubeflow/kubeflow-gateway");
        assert_eq!(spec["http"][0]["match"][0]["uri"]["prefix"], "/cloudtty/alice/shell/");
        assert_eq!(spec["http"][0]["rewrite"]["uri"], "/");
        assert_eq!(
            spec["http"][0]["route"][0]["destination"]["host"],
            "clusterip-service-shell-0-7681.alice.svc.cluster.local"
        );
        assert_eq!(spec["http"][0]["route"][0]["destination"]["port"]["number"], 7681);
    }

    #[tokio::test]
    async fn test_publish_tolerates_an_existing_route() {
        let gateway = Arc::new(MockGateway::default());

        let first = publish(gateway.as_ref(), "alice", "svc1", &[], "gw/gw", "/cloudtty/alice/x/", 7681)
            .await
            .unwrap();
        let second = publish(gateway.as_ref(), "alice", "svc1", &[], "gw/gw", "/cloudtty/alice/x/", 7681)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.custom_objects.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_propagates_creation_failures() {
        let gateway =
            Arc::new(MockGateway { fail_create: vec!["virtualservices"], ..MockGateway::default() });

        let err = publish(gateway.as_ref(), "alice", "svc1", &[], "gw/gw", "/cloudtty/alice/x/", 7681)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CreateRoute { .. }));
    }
}
