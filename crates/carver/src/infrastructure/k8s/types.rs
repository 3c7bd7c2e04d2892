use core::error::Error;

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Failed to watch nodes: {message}")]
    WatchFailed { message: String },
    #[display("Failed to list pods on node {node}: {message}")]
    PodListFailed { node: String, message: String },
}

impl Error for KubernetesError {}
