use snafu::Snafu;

use crate::{gateway, route};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to evict cloudshell {session_name} in namespace {namespace}, error: {source}"))]
    EvictSession { namespace: String, session_name: String, source: gateway::Error },

    #[snafu(display("Failed to create cloudshell {session_name} in namespace {namespace}, error: {source}"))]
    CreateSession { namespace: String, session_name: String, source: gateway::Error },

    #[snafu(display("Failed to read cloudshell {session_name} in namespace {namespace}, error: {source}"))]
    ReadSession { namespace: String, session_name: String, source: gateway::Error },

    #[snafu(display("Cloudshell {session_name} never published its backing service, gave up after {attempts} polls"))]
    PollTimeout { session_name: String, attempts: u32 },

    #[snafu(display("Shutdown requested while waiting for cloudshell {session_name}"))]
    Cancelled { session_name: String },

    #[snafu(display("Failed to publish route for cloudshell {session_name}, error: {source}"))]
    PublishRoute { session_name: String, source: route::Error },
}
