//! HTTP surface of the server.
//!
//! One axum router over one shared [`AppState`]; the listener runs under a
//! `sigfinn` lifecycle manager so SIGINT/SIGTERM drain connections and
//! cancel in-flight readiness waits through the shared token.

pub mod error;
pub mod response;
pub mod routes;

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{delete, get, post},
};
use sigfinn::{ExitStatus, LifecycleManager};
use snafu::ResultExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{
    cloudshell::PollSettings,
    config::{Config, SpawnerConfigCache},
    gateway::ClusterGateway,
};

pub use self::error::Error;

/// Everything a handler needs, shared by clone.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn ClusterGateway>,
    pub config: Arc<Config>,
    pub spawner: Arc<SpawnerConfigCache>,
    pub poll: PollSettings,
    pub shutdown: CancellationToken,
}

impl AppState {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        config: Config,
        shutdown: CancellationToken,
    ) -> Self {
        let poll = PollSettings {
            settle: Duration::from_secs(config.shell.eviction_settle_seconds),
            interval: Duration::from_secs(config.shell.poll_interval_seconds),
            budget: config.shell.poll_budget,
        };
        let spawner = Arc::new(SpawnerConfigCache::new(&config.spawner));
        Self { gateway, config: Arc::new(config), spawner, poll, shutdown }
    }
}

/// Builds the full route table over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/config", get(routes::platform::spawner_config))
        .route("/api/gpus", get(routes::platform::gpu_vendors))
        .route("/api/namespaces/{namespace}/pvcs", get(routes::platform::persistent_volume_claims))
        .route("/api/namespaces/{namespace}/poddefaults", get(routes::platform::pod_defaults))
        .route("/api/namespaces/{namespace}/notebooks", get(routes::notebooks::list_notebooks))
        .route(
            "/api/namespaces/{namespace}/notebooks/{notebook_name}",
            get(routes::notebooks::get_notebook).delete(routes::notebooks::delete_notebook),
        )
        .route(
            "/api/namespaces/{namespace}/notebooks/{notebook_name}/pod",
            get(routes::notebooks::get_notebook_pod),
        )
        .route(
            "/api/namespaces/{namespace}/notebooks/{notebook_name}/pod/{pod_name}/logs",
            get(routes::notebooks::get_pod_logs),
        )
        .route("/api/namespaces/{namespace}/pod", get(routes::notebooks::get_pod))
        .route(
            "/api/namespaces/{namespace}/notebooks/{notebook_name}/ssh",
            post(routes::access::ssh),
        )
        .route(
            "/api/namespaces/{namespace}/notebooks/{notebook_name}/portforward",
            post(routes::access::port_forward),
        )
        .route("/api/namespaces/{namespace}/containers", post(routes::containers::create_container))
        .route(
            "/api/namespaces/{namespace}/containers/{container_name}",
            delete(routes::containers::delete_container),
        )
        .route(
            "/api/namespaces/{namespace}/containers/{container_name}/shell",
            post(routes::access::shell),
        )
        .with_state(state)
}

/// Serves the API until an interrupt or termination signal arrives.
///
/// # Errors
///
/// Fails when the listener cannot be bound or the server terminates
/// abnormally.
pub async fn serve(gateway: Arc<dyn ClusterGateway>, config: Config) -> Result<(), Error> {
    let shutdown = CancellationToken::new();
    let state = AppState::new(gateway, config, shutdown);
    let listen_address = state.config.listen_address;

    let lifecycle_manager = LifecycleManager::<Error>::new();
    let _handle = lifecycle_manager.spawn("http-server", move |shutdown_signal| async move {
        match run_http_server(listen_address, state, shutdown_signal).await {
            Ok(()) => ExitStatus::Success,
            Err(err) => ExitStatus::Error(err),
        }
    });

    if let Ok(Err(err)) = lifecycle_manager.serve().await {
        tracing::error!("{err}");
        Err(err)
    } else {
        Ok(())
    }
}

async fn run_http_server(
    listen_address: SocketAddr,
    state: AppState,
    shutdown_signal: impl Future<Output = ()> + Send + Unpin + 'static,
) -> Result<(), Error> {
    let listener = TcpListener::bind(listen_address)
        .await
        .context(error::BindListenerSnafu { listen_address })?;
    tracing::info!("Listening on {listen_address}");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal.await;
            shutdown.cancel();
        })
        .await
        .context(error::ServeSnafu)
}
