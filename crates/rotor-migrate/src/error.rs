//! Migration error types.

use std::time::Duration;

use thiserror::Error;

use rotor_core::ApiError;

/// Fatal migration failures. Everything else is retried inside the session.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "a minimum healthy percentage of {min_healthy_percent}% leaves no room to replace any of {instances} instances, lower the threshold"
    )]
    NoCapacity { min_healthy_percent: u32, instances: u32 },

    #[error("auto scaling group does not exist: {0}")]
    GroupNotFound(String),

    #[error("failed to get container instances for {cluster}: {source}")]
    Cluster {
        cluster: String,
        #[source]
        source: ApiError,
    },

    #[error("migration stalled: no instance made progress for {}s", .idle.as_secs())]
    Stalled { idle: Duration },

    #[error("failed to get auto scaling group {group}: {source}")]
    Group {
        group: String,
        #[source]
        source: ApiError,
    },
}

impl MigrateError {
    /// Map a failed group listing, keeping not-found distinct.
    pub fn from_listing(group: &str, err: ApiError) -> Self {
        match err {
            ApiError::GroupNotFound(name) => Self::GroupNotFound(name),
            other => Self::Group {
                group: group.to_string(),
                source: other,
            },
        }
    }
}

pub type MigrateResult<T> = Result<T, MigrateError>;
