//! Interactive shell sessions against workload pods.
//!
//! A session is a `CloudShell` custom resource running `kubectl exec` against
//! the target pod; the cloudtty controller materializes it and advertises the
//! backing service through a label on the session object. Opening a shell is
//! a four step flow: evict any prior session for the pod, create a fresh one,
//! wait for the backing-service label, then publish the HTTP route to it.
//!
//! One pod has at most one session. The session name is derived from the pod
//! name, so a concurrent request that loses the creation race simply adopts
//! the session the winner created.

pub mod error;

use std::time::Duration;

use dendrite_base::consts::{self, k8s, k8s::kinds};
use k8s_openapi::{api::core::v1::Pod, apimachinery::pkg::apis::meta::v1::OwnerReference};
use kube::api::DynamicObject;
use serde_json::json;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::{
    exposure::ExposureKind,
    ext::PodExt,
    gateway::{self, ClusterGateway},
    route,
};

pub use self::error::Error;

/// Timing knobs for the eviction settle delay and the readiness poll.
#[derive(Clone, Copy, Debug)]
pub struct PollSettings {
    pub settle: Duration,
    pub interval: Duration,
    pub budget: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            settle: consts::CLOUDSHELL_EVICTION_SETTLE,
            interval: consts::CLOUDSHELL_POLL_INTERVAL,
            budget: consts::CLOUDSHELL_POLL_BUDGET,
        }
    }
}

/// Where a session stands on its way to readiness.
#[derive(Debug)]
enum SessionPhase {
    Requested,
    Pending { attempts: u32 },
    Ready { backing_service: String },
    TimedOut { attempts: u32 },
}

/// One shell request, resolved to a concrete pod.
#[derive(Clone, Copy, Debug)]
pub struct ShellRequest<'a> {
    pub namespace: &'a str,
    pub workload_name: &'a str,
    pub pod: &'a Pod,
    pub command: Option<&'a str>,
}

/// Outcome of a successful [`open_shell`] call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenedShell {
    pub session_name: String,
    pub backing_service: String,
    pub route: String,
}

#[must_use]
pub fn session_name(pod_name: &str) -> String { format!("cloudshell-{pod_name}") }

/// Opens an interactive shell session against the request's pod and
/// publishes the route to reach it.
///
/// # Errors
///
/// Fails when the prior session cannot be evicted, the new one cannot be
/// created, the backing service never appears within the polling budget, the
/// wait is interrupted by shutdown, or the route cannot be published.
pub async fn open_shell(
    gateway: &dyn ClusterGateway,
    request: ShellRequest<'_>,
    istio_gateway: &str,
    poll: &PollSettings,
    shutdown: &CancellationToken,
) -> Result<OpenedShell, Error> {
    let ShellRequest { namespace, workload_name, pod, command } = request;
    let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
    let command = command.unwrap_or(consts::DEFAULT_SHELL_COMMAND);

    evict_existing(gateway, namespace, pod_name, poll.settle).await?;
    let session = create_session(gateway, namespace, pod, command).await?;
    let name = session.metadata.name.clone().unwrap_or_else(|| session_name(pod_name));

    let backing_service = wait_for_backing_service(gateway, namespace, &name, poll, shutdown).await?;

    let owner_references = vec![session_owner_reference(&session)];
    let prefix = format!("{}/{namespace}/{workload_name}/", consts::CLOUDSHELL_ROUTE_PREFIX);
    let route = route::publish(
        gateway,
        namespace,
        &backing_service,
        &owner_references,
        istio_gateway,
        &prefix,
        consts::CLOUDSHELL_HTTP_PORT,
    )
    .await
    .with_context(|_| error::PublishRouteSnafu { session_name: name.clone() })?;

    Ok(OpenedShell { session_name: name, backing_service, route })
}

/// Deletes the session bound to `pod_name` if one exists, then waits out the
/// settle delay. A missing session is success; deletion is asynchronous, so
/// the delay keeps the follow-up create from racing the terminating object.
pub async fn evict_existing(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    pod_name: &str,
    settle: Duration,
) -> Result<(), Error> {
    let name = session_name(pod_name);

    match gateway.get_custom(kinds::CLOUDSHELL, namespace, &name).await {
        Ok(_) => {}
        Err(gateway::Error::NotFound { .. }) => return Ok(()),
        Err(source) => {
            return Err(source).context(error::EvictSessionSnafu { namespace, session_name: name });
        }
    }

    match gateway.delete_custom(kinds::CLOUDSHELL, namespace, &name).await {
        Ok(()) | Err(gateway::Error::NotFound { .. }) => {}
        Err(source) => {
            return Err(source).context(error::EvictSessionSnafu { namespace, session_name: name });
        }
    }

    tokio::time::sleep(settle).await;
    tracing::info!("Deleted existing cloudshell {name} in namespace {namespace}");
    Ok(())
}

/// Creates the session object for `pod`, embedding `command` as the exec
/// invocation. Losing a creation race is benign; the existing session is
/// read back and adopted, whatever command it carries.
pub async fn create_session(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    pod: &Pod,
    command: &str,
) -> Result<DynamicObject, Error> {
    let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
    let name = session_name(pod_name);
    let manifest = json!({
        "apiVersion": kinds::CLOUDSHELL.api_version(),
        "kind": kinds::CLOUDSHELL.kind,
        "metadata": {
            "name": name,
            "namespace": namespace,
            "ownerReferences": pod.owner_references(),
        },
        "spec": {
            "exposureMode": ExposureKind::ClusterIp.service_type(),
            "commandAction": format!("kubectl exec -n {namespace} -it {pod_name} -- {command}"),
        },
    });

    match gateway.create_custom(kinds::CLOUDSHELL, namespace, manifest).await {
        Ok(session) => {
            tracing::info!("Created cloudshell {name} in namespace {namespace}");
            Ok(session)
        }
        Err(gateway::Error::AlreadyExists { .. }) => {
            tracing::info!("Cloudshell {name} already exists in namespace {namespace}, adopting it");
            gateway
                .get_custom(kinds::CLOUDSHELL, namespace, &name)
                .await
                .context(error::ReadSessionSnafu { namespace, session_name: name })
        }
        Err(source) => Err(source).context(error::CreateSessionSnafu { namespace, session_name: name }),
    }
}

/// Polls the session until the cloudtty controller labels it with the name
/// of the backing service. The wait is a small state machine so shutdown can
/// interrupt it between polls instead of holding the request captive.
pub async fn wait_for_backing_service(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    session: &str,
    poll: &PollSettings,
    shutdown: &CancellationToken,
) -> Result<String, Error> {
    let mut phase = SessionPhase::Requested;
    loop {
        phase = match phase {
            SessionPhase::Requested => SessionPhase::Pending { attempts: 0 },
            SessionPhase::Pending { attempts } if attempts >= poll.budget => {
                SessionPhase::TimedOut { attempts }
            }
            SessionPhase::Pending { attempts } => {
                if attempts > 0 {
                    tokio::select! {
                        () = shutdown.cancelled() => {
                            return error::CancelledSnafu { session_name: session }.fail();
                        }
                        () = tokio::time::sleep(poll.interval) => {}
                    }
                }

                let object = gateway
                    .get_custom(kinds::CLOUDSHELL, namespace, session)
                    .await
                    .context(error::ReadSessionSnafu { namespace, session_name: session })?;
                match backing_service_label(&object) {
                    Some(backing_service) => SessionPhase::Ready { backing_service },
                    None => SessionPhase::Pending { attempts: attempts + 1 },
                }
            }
            SessionPhase::Ready { backing_service } => return Ok(backing_service),
            SessionPhase::TimedOut { attempts } => {
                tracing::error!("Timed out waiting for the backing service of cloudshell {session}");
                return error::PollTimeoutSnafu { session_name: session, attempts }.fail();
            }
        };
    }
}

fn backing_service_label(object: &DynamicObject) -> Option<String> {
    object
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(k8s::labels::CLOUDSHELL_BACKING_SERVICE))
        .filter(|value| !value.is_empty())
        .cloned()
}

fn session_owner_reference(session: &DynamicObject) -> OwnerReference {
    OwnerReference {
        api_version: session
            .types
            .as_ref()
            .map_or_else(|| kinds::CLOUDSHELL.api_version(), |types| types.api_version.clone()),
        kind: session
            .types
            .as_ref()
            .map_or_else(|| kinds::CLOUDSHELL.kind.to_string(), |types| types.kind.clone()),
        name: session.metadata.name.clone().unwrap_or_default(),
        uid: session.metadata.uid.clone().unwrap_or_default(),
        ..OwnerReference::default()
    }
}
