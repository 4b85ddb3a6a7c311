//! Drain error types.

use std::time::Duration;

use thiserror::Error;

/// Terminal failures of a drain attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DrainError {
    #[error("failed to drain {instance_id} in cluster {cluster}: {message}")]
    Request {
        instance_id: String,
        cluster: String,
        message: String,
    },

    #[error(
        "timeout reached when trying to drain {instance_id} in cluster {cluster} after {}s",
        .elapsed.as_secs()
    )]
    TimedOut {
        instance_id: String,
        cluster: String,
        elapsed: Duration,
    },
}

impl DrainError {
    pub fn instance_id(&self) -> &str {
        match self {
            Self::Request { instance_id, .. } | Self::TimedOut { instance_id, .. } => instance_id,
        }
    }
}

pub type DrainResult<T> = Result<T, DrainError>;
