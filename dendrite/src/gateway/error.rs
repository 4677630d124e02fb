use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{kind} {name} not found in namespace {namespace}"))]
    NotFound { kind: &'static str, namespace: String, name: String },

    #[snafu(display("{kind} {name} already exists in namespace {namespace}"))]
    AlreadyExists { kind: &'static str, namespace: String, name: String },

    #[snafu(display("Not allowed to {verb} {resource} in namespace {namespace}"))]
    Forbidden { verb: &'static str, resource: String, namespace: String },

    #[snafu(display("Failed to run authorization review, error: {source}"))]
    AuthorizationReview {
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("Failed to {verb} {kind} in namespace {namespace}, error: {source}"))]
    Api {
        verb: &'static str,
        kind: &'static str,
        namespace: String,
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("Failed to encode {kind} manifest, error: {source}"))]
    EncodeManifest { kind: &'static str, source: serde_json::Error },

    #[snafu(display("Failed to execute command in pod {pod_name} in namespace {namespace}, error: {source}"))]
    Exec {
        namespace: String,
        pod_name: String,
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("Failed to read command output from pod {pod_name} in namespace {namespace}, error: {source}"))]
    ExecStream { namespace: String, pod_name: String, source: std::io::Error },
}

impl Error {
    /// Maps a raw API failure onto [`Error::NotFound`] or
    /// [`Error::AlreadyExists`] when the status code says so, keeping the
    /// generic [`Error::Api`] for everything else.
    pub(crate) fn classify(
        verb: &'static str,
        kind: &'static str,
        namespace: &str,
        name: &str,
        source: kube::Error,
    ) -> Self {
        match source {
            kube::Error::Api(ref response) if response.code == 404 => Self::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(ref response) if response.code == 409 => Self::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            source => Self::Api {
                verb,
                kind,
                namespace: namespace.to_string(),
                source: Box::new(source),
            },
        }
    }
}
