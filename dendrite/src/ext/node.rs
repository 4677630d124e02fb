use k8s_openapi::api::core::v1::Node;

pub trait NodeExt {
    fn internal_ip(&self) -> Option<&str>;
}

impl NodeExt for Node {
    fn internal_ip(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|status| status.addresses.as_ref())
            .and_then(|addresses| addresses.iter().find(|address| address.type_ == "InternalIP"))
            .map(|address| address.address.as_str())
    }
}
