//! Resolves workloads to their backing pods.
//!
//! Notebook servers and custom containers both label their pods with the
//! workload name, so "the pod of workload X" is a label-selector query. A
//! workload may briefly own several pods while the controller replaces one
//! generation with the next; callers always get the most recently created
//! pod in that case.

use dendrite_base::consts::k8s;
use k8s_openapi::api::core::v1::Pod;
use snafu::{ResultExt, Snafu};

use crate::{
    ext::{NodeExt, PodExt},
    gateway::{self, ClusterGateway},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("No pod found for workload {workload_name} in namespace {namespace}"))]
    PodNotFound { namespace: String, workload_name: String },

    #[snafu(display("Failed to list pods of workload {workload_name} in namespace {namespace}, error: {source}"))]
    ListPods { namespace: String, workload_name: String, source: gateway::Error },
}

/// Finds the pod backing a workload.
///
/// # Errors
///
/// Fails with [`Error::PodNotFound`] when no pod carries the workload label,
/// and with [`Error::ListPods`] when the pod list cannot be fetched.
pub async fn resolve_pod(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    workload_name: &str,
) -> Result<Pod, Error> {
    let selector = format!("{}={workload_name}", k8s::labels::NOTEBOOK_NAME);
    let mut pods = gateway
        .list_pods(namespace, Some(&selector))
        .await
        .context(ListPodsSnafu { namespace, workload_name })?;

    if pods.len() > 1 {
        tracing::warn!(
            "Workload {workload_name} in namespace {namespace} has {} pods, using the most recently created",
            pods.len()
        );
    }

    pods.sort_by_key(|pod| pod.created_at().map(|time| time.0));
    pods.pop().ok_or_else(|| Error::PodNotFound {
        namespace: namespace.to_string(),
        workload_name: workload_name.to_string(),
    })
}

/// Returns the internal address of the node hosting `pod`, or `None` when
/// the pod is not scheduled or the node cannot be read.
pub async fn node_address(gateway: &dyn ClusterGateway, pod: &Pod) -> Option<String> {
    let node_name = pod.node_name()?;
    match gateway.get_node(node_name).await {
        Ok(node) => node.internal_ip().map(str::to_string),
        Err(err) => {
            tracing::warn!("Failed to read node {node_name}, error: {err}");
            None
        }
    }
}
