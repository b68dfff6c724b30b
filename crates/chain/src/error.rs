use thiserror::Error;
use tutor_core::CallStatus;

/// Failure reported by the external capability interface.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArgumentError {
    #[error("missing required argument(s): {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("argument {0} must be a string or number")]
    NotScalar(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("function call is {0}, only approved calls can run")]
    NotApproved(CallStatus),
    #[error("unknown capability {0:?}")]
    UnknownCapability(String),
    #[error("invalid arguments for {capability}: {source}")]
    InvalidArguments {
        capability: &'static str,
        #[source]
        source: ArgumentError,
    },
    #[error("{capability} failed: {source}")]
    Backend {
        capability: &'static str,
        #[source]
        source: BackendError,
    },
}
