//! Error types for operations exposed by the control plane

use std::fmt;

/// Result type alias for control plane operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can surface to callers of the control plane
#[derive(Debug)]
pub enum ControlError {
    /// The request was rejected before reaching any component
    InvalidRequest(String),

    /// The referenced alert or scaling action does not exist
    NotFound(String),

    /// An upstream dependency failed and no fallback was available
    Upstream(anyhow::Error),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            ControlError::NotFound(what) => write!(f, "not found: {}", what),
            ControlError::Upstream(err) => write!(f, "upstream failure: {:#}", err),
        }
    }
}

impl std::error::Error for ControlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControlError::Upstream(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for ControlError {
    fn from(err: anyhow::Error) -> Self {
        ControlError::Upstream(err)
    }
}
