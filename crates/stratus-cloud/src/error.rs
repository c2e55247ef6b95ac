//! Error taxonomy for resource handlers
//!
//! Remote failures arrive as [`ApiError`], already classified into an
//! [`ErrorKind`] by the provider's code table. Only the kinds that cannot be
//! recovered locally ever surface to the orchestrator as a [`CloudError`].

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Provider-independent classification of a remote error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote object does not exist (or is not visible yet)
    NotFound,
    /// A detach was requested for an object that is not attached
    NotAttached,
    /// A dependent object still references the target; try again later
    DependencyViolation,
    /// Anything else, including codes the provider does not recognise
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::NotAttached => write!(f, "not-attached"),
            ErrorKind::DependencyViolation => write!(f, "dependency-violation"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Typed error returned by a remote API call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// Stable machine-readable code reported by the remote API
    pub code: String,

    /// Human-readable reason
    pub message: String,

    /// Classification assigned by the provider's code table
    pub kind: ErrorKind,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_not_attached(&self) -> bool {
        self.kind == ErrorKind::NotAttached
    }

    pub fn is_dependency_violation(&self) -> bool {
        self.kind == ErrorKind::DependencyViolation
    }
}

/// Handler lifecycle operation, used for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Errors surfaced by the convergence engine and resource handlers
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Unexpected state '{state}' for {resource_id}, wanted target '{target}'")]
    UnexpectedState {
        resource_id: String,
        state: String,
        target: String,
    },

    #[error("Timeout after {timeout:?} waiting for {resource_id} to become '{target}'")]
    Timeout {
        resource_id: String,
        target: String,
        timeout: Duration,
    },

    #[error("Gave up on {resource_id} after {timeout:?}: {last}")]
    RetryTimeout {
        resource_id: String,
        timeout: Duration,
        last: Box<CloudError>,
    },

    #[error("{resource_id} is not visible yet")]
    NotVisible { resource_id: String },

    #[error("Lookup of {resource_id} returned {found}")]
    Mismatch { resource_id: String, found: String },

    #[error("Error during {operation} of {resource_type} ({resource_id}): {source}")]
    Operation {
        operation: Operation,
        resource_type: String,
        resource_id: String,
        #[source]
        source: Box<CloudError>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource type not found: {0}")]
    ResourceTypeNotFound(String),

    #[error("{resource_type} does not support {operation}")]
    UnsupportedOperation {
        resource_type: String,
        operation: Operation,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// The remote error behind this one, looking through operation context
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            CloudError::Api(e) => Some(e),
            CloudError::Operation { source, .. } => source.api_error(),
            _ => None,
        }
    }

    /// Classification of the underlying remote error, if there is one
    pub fn kind(&self) -> Option<ErrorKind> {
        self.api_error().map(|e| e.kind)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            CloudError::Timeout { .. } | CloudError::RetryTimeout { .. } => true,
            CloudError::Operation { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
