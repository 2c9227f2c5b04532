//! Error types for the KafkaRebalance controller

use thiserror::Error;

use crate::cruise_control;

/// Everything a reconciliation can fail with, tagged by origin.
///
/// Every variant keeps the `Error` suffix so the names read the same at
/// call sites, which trips the clippy variant-name lint.
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{0}")]
    CruiseControlError(#[from] cruise_control::Error),

    /// The resource or its cluster binding is invalid; exited only by a
    /// user edit or a refresh annotation
    #[error("Invalid resource: {0}")]
    ValidationError(String),

    /// The Kafka cluster named by the cluster label does not exist
    #[error("No such resource: {0}")]
    NoSuchClusterError(String),

    /// Consecutive transport failures exhausted the polling retry budget
    #[error("Unable to reach Cruise Control API after {attempts} attempts")]
    RetriesExhaustedError { attempts: u32 },

    /// Per-resource lock could not be acquired in time; the event is dropped
    #[error("Failed to acquire lock for {key} within {timeout_ms}ms")]
    LockTimeoutError { key: String, timeout_ms: u64 },

    /// A broken invariant, e.g. multiple state conditions in one status
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Condition reason recorded when this error is projected into a
    /// NotReady status
    pub fn reason(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "KubernetesClientError",
            Error::SerializationError(_) => "SerializationError",
            Error::CruiseControlError(e) => match e {
                cruise_control::Error::Transport(_) => "CruiseControlTransportError",
                cruise_control::Error::Http { .. } => "CruiseControlRestError",
                cruise_control::Error::Protocol(_) => "CruiseControlProtocolError",
            },
            Error::ValidationError(_) => "InvalidResourceException",
            Error::NoSuchClusterError(_) => "NoSuchResourceException",
            Error::RetriesExhaustedError { .. } => "CruiseControlTransportError",
            Error::LockTimeoutError { .. } => "LockTimeout",
            Error::InternalError(_) => "InternalError",
        }
    }

    /// Check if this error is retryable within a polling sequence
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // Of the client errors only conflicts and throttling
                    // clear up on their own
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        code == 409 || code == 429
                    } else {
                        true
                    }
                }
                _ => true,
            },
            Error::CruiseControlError(e) => e.is_retryable(),
            Error::SerializationError(_) => false,
            Error::ValidationError(_) => false,
            Error::NoSuchClusterError(_) => false,
            Error::RetriesExhaustedError { .. } => false,
            Error::LockTimeoutError { .. } => true,
            Error::InternalError(_) => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
