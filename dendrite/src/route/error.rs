use snafu::Snafu;

use crate::gateway;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to create virtual service {route_name} in namespace {namespace}, error: {source}"))]
    CreateRoute { namespace: String, route_name: String, source: gateway::Error },
}
