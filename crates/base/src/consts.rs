use std::{sync::LazyLock, time::Duration};

pub mod k8s {
    /// Cluster DNS zone suffix for namespaced Services.
    pub const CLUSTER_DOMAIN: &str = "svc.cluster.local";

    pub mod labels {
        pub const APP: &str = "app";
        pub const NOTEBOOK_NAME: &str = "notebook-name";
        pub const CONTAINER_TYPE: &str = "container-type";

        /// Value of [`CONTAINER_TYPE`] carried by ad-hoc container workloads.
        pub const CUSTOM_CONTAINER: &str = "custom-container";

        /// Populated by the CloudShell controller once the backing service
        /// for a session exists.
        pub const CLOUDSHELL_BACKING_SERVICE: &str = "cloudshell.cloudtty.io/pod-name";
    }

    pub mod annotations {
        pub const CREATOR: &str = "notebooks.kubeflow.org/creator";
        pub const SERVER_TYPE: &str = "notebooks.kubeflow.org/server-type";
        pub const LAST_ACTIVITY: &str = "notebooks.kubeflow.org/last-activity";
    }

    /// Coordinates of the namespaced custom resources the server touches.
    pub mod kinds {
        #[derive(Clone, Copy, Debug, Eq, PartialEq)]
        pub struct CustomKind {
            pub group: &'static str,
            pub version: &'static str,
            pub kind: &'static str,
            pub plural: &'static str,
        }

        impl CustomKind {
            #[must_use]
            pub fn api_version(&self) -> String { format!("{}/{}", self.group, self.version) }
        }

        pub const CLOUDSHELL: CustomKind = CustomKind {
            group: "cloudshell.cloudtty.io",
            version: "v1alpha1",
            kind: "CloudShell",
            plural: "cloudshells",
        };

        pub const AUTHORIZATION_POLICY: CustomKind = CustomKind {
            group: "security.istio.io",
            version: "v1beta1",
            kind: "AuthorizationPolicy",
            plural: "authorizationpolicies",
        };

        pub const VIRTUAL_SERVICE: CustomKind = CustomKind {
            group: "networking.istio.io",
            version: "v1beta1",
            kind: "VirtualService",
            plural: "virtualservices",
        };

        pub const NOTEBOOK: CustomKind = CustomKind {
            group: "kubeflow.org",
            version: "v1beta1",
            kind: "Notebook",
            plural: "notebooks",
        };

        pub const POD_DEFAULT: CustomKind = CustomKind {
            group: "kubeflow.org",
            version: "v1alpha1",
            kind: "PodDefault",
            plural: "poddefaults",
        };
    }
}

pub const SSH_PORT: u16 = 22;
pub const SSH_USERNAME: &str = "jovyan";
pub const SSH_PRIVATE_KEY_PATH: &str = "/home/jovyan/.ssh/id_rsa";
pub static SSH_PRIVATE_KEY_COMMAND: LazyLock<Vec<String>> =
    LazyLock::new(|| vec!["cat".to_string(), SSH_PRIVATE_KEY_PATH.to_string()]);

pub const DEFAULT_SHELL_COMMAND: &str = "/bin/bash";

/// Port served by the web terminal inside a CloudShell backing pod.
pub const CLOUDSHELL_HTTP_PORT: u16 = 7681;
pub const CLOUDSHELL_ROUTE_PREFIX: &str = "/cloudtty";
pub const CLOUDSHELL_POLL_BUDGET: u32 = 30;
pub const CLOUDSHELL_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const CLOUDSHELL_EVICTION_SETTLE: Duration = Duration::from_secs(2);

pub const DEFAULT_ISTIO_GATEWAY: &str = "kubeflow/kubeflow-gateway";

pub const CUSTOM_CONTAINER_SCHEDULER: &str = "reservation-scheduler";

pub const SPAWNER_UI_CONFIG_PATH: &str = "/etc/config/spawner_ui_config.yaml";
pub const SPAWNER_UI_CONFIG_DEV_PATH: &str = "spawner_ui_config.yaml";
pub const SPAWNER_UI_CONFIG_TTL: Duration = Duration::from_secs(60);
