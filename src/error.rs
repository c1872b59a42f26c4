//! Error types for the remote-process adapter.

use std::time::Duration;

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while launching or supervising a remote child process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Preflight Errors
    // =========================================================================
    /// The entrypoint probe ran but its logs were unusable.
    #[error("failed to probe entrypoint of image '{image}': {reason}")]
    EntrypointProbeFailed { image: String, reason: String },

    /// The image does not declare an entrypoint environment variable.
    #[error("image '{image}' does not set an entrypoint variable; it cannot run as a remote process")]
    EntrypointMissing { image: String },

    /// A manifest failed validation before submission.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    // =========================================================================
    // Scheduling Errors
    // =========================================================================
    /// No pod appeared under the workload's label after submission.
    #[error("no pod found for workload '{workload}' within {timeout:?}")]
    PodNotScheduled { workload: String, timeout: Duration },

    /// A bounded wait on pod state elapsed.
    #[error("timed out after {timeout:?} waiting for {operation} on pod '{pod}'")]
    PodWaitTimeout {
        pod: String,
        operation: String,
        timeout: Duration,
    },

    /// The pod disappeared while the adapter still expected it to exist.
    #[error("pod '{pod}' vanished without a kill being issued")]
    PodVanished { pod: String },

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Exit code requested before the pod reached a terminal state.
    #[error("pod '{pod}' has not exited yet")]
    NotTerminated { pod: String },

    /// A stream was requested before its sidecar connected, or taken twice.
    #[error("{stream} stream is not available")]
    StreamUnavailable { stream: &'static str },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The pod never reported an IP address to dial for stdin.
    #[error("pod '{pod}' has no IP address to attach stdin to")]
    PodAddressUnknown { pod: String },

    /// Local address discovery failed; relay sidecars cannot be pointed home.
    #[error("failed to discover the caller's host address: {0}")]
    HostAddressUnknown(String),

    /// Generic I/O error (sockets, temp files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Cluster Errors
    // =========================================================================
    /// The cluster client rejected or failed an API operation.
    #[error("cluster operation '{operation}' failed: {reason}")]
    Cluster { operation: String, reason: String },
}

impl Error {
    /// Convenience constructor for cluster client implementations.
    pub fn cluster(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cluster {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}
