//! Error types for the static routing agent

use thiserror::Error;

/// Errors surfaced by the agent, its ports and its reconciler
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error that is neither a conflict nor a missing object
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The requested object does not exist (HTTP 404)
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The object was modified concurrently (HTTP 409)
    #[error("Conflict while writing {0}: object has been modified")]
    Conflict(String),

    /// The kernel routing interface could not be queried
    #[error("I/O error: {0}")]
    IoError(String),

    /// A destination or gateway in an NRT spec could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A route could not be added to or deleted from the kernel
    #[error("unable to {op} route {route}: {message}")]
    KernelMutation {
        op: &'static str,
        route: String,
        message: String,
    },

    /// Invalid process configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The pass was interrupted by shutdown
    #[error("Reconciliation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the controller should retry quickly after this error
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_) | Error::Conflict(_) | Error::IoError(_) | Error::KernelMutation { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Short label used for the reconcile error metric
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::IoError(_) => "io",
            Error::ParseError(_) => "parse",
            Error::KernelMutation { .. } => "kernel_mutation",
            Error::ConfigError(_) => "config",
            Error::SerializationError(_) => "serialization",
            Error::Cancelled => "cancelled",
        }
    }

    /// Map a kube client error for the object `name` onto the agent's error kinds
    pub fn from_kube(name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref ae) if ae.code == 404 => Error::NotFound(name.to_string()),
            kube::Error::Api(ref ae) if ae.code == 409 => Error::Conflict(name.to_string()),
            other => Error::KubeError(other),
        }
    }
}
