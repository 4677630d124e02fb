use snafu::Snafu;

use crate::gateway;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to create service {service_name} in namespace {namespace}, error: {source}"))]
    CreateService { namespace: String, service_name: String, source: gateway::Error },

    #[snafu(display("Failed to read back service {service_name} in namespace {namespace}, error: {source}"))]
    ReadBackService { namespace: String, service_name: String, source: gateway::Error },

    #[snafu(display("No node port assigned to service {service_name} in namespace {namespace}"))]
    PortUnassigned { namespace: String, service_name: String },
}
