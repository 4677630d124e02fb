use k8s_openapi::{
    Metadata,
    api::core::v1::Pod,
    apimachinery::pkg::apis::meta::v1::{OwnerReference, Time},
};

pub trait PodExt {
    fn node_name(&self) -> Option<&str>;

    fn owner_references(&self) -> Vec<OwnerReference>;

    fn created_at(&self) -> Option<&Time>;
}

impl PodExt for Pod {
    fn node_name(&self) -> Option<&str> {
        self.spec.as_ref().and_then(|spec| spec.node_name.as_deref())
    }

    fn owner_references(&self) -> Vec<OwnerReference> {
        self.metadata().owner_references.clone().unwrap_or_default()
    }

    fn created_at(&self) -> Option<&Time> { self.metadata().creation_timestamp.as_ref() }
}
