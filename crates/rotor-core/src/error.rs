//! Error types for capability calls against the fleet and cluster services.

use thiserror::Error;

/// Result type alias for capability calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by `FleetDirectory`, `ClusterRegistry` and `TerminationClient`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("auto scaling group does not exist: {0}")]
    GroupNotFound(String),

    #[error("{operation} failed: {message}")]
    Request { operation: String, message: String },
}

impl ApiError {
    /// Build a `Request` error for the named operation.
    pub fn request(operation: &str, message: impl Into<String>) -> Self {
        Self::Request {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            ApiError::GroupNotFound("web".into()).to_string(),
            "auto scaling group does not exist: web"
        );
        assert_eq!(
            ApiError::request("terminate", "throttled").to_string(),
            "terminate failed: throttled"
        );
    }
}
