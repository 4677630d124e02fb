use std::net::SocketAddr;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use snafu::Snafu;

use crate::{cloudshell, config, gateway, server::response, workload};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to bind HTTP listener on {listen_address}, error: {source}"))]
    BindListener { listen_address: SocketAddr, source: std::io::Error },

    #[snafu(display("HTTP server terminated abnormally, error: {source}"))]
    Serve { source: std::io::Error },
}

/// A failure already translated to its caller-visible form.
///
/// Handlers either build one directly, for the endpoints whose messages are
/// part of the API contract, or convert an internal error through the `From`
/// impls below.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        response::failure(self.status, &self.message).into_response()
    }
}

impl From<gateway::Error> for ApiError {
    fn from(err: gateway::Error) -> Self {
        let status = match &err {
            gateway::Error::NotFound { .. } => StatusCode::NOT_FOUND,
            gateway::Error::AlreadyExists { .. } => StatusCode::CONFLICT,
            gateway::Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<workload::Error> for ApiError {
    fn from(err: workload::Error) -> Self {
        match err {
            workload::Error::PodNotFound { .. } => Self::not_found("No pod detected."),
            workload::Error::ListPods { source, .. } => Self::from(source),
        }
    }
}

impl From<cloudshell::Error> for ApiError {
    fn from(err: cloudshell::Error) -> Self {
        match &err {
            cloudshell::Error::CreateSession { .. } => {
                Self::internal("Failed to create CloudShell.")
            }
            cloudshell::Error::PollTimeout { .. } => {
                Self::internal("Timed out waiting for CloudShell pod-name label")
            }
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<config::Error> for ApiError {
    fn from(err: config::Error) -> Self {
        match &err {
            config::Error::SpawnerConfigNotFound => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}
