//! rotor-core — shared types for rolling scaling-group migrations.
//!
//! Holds the fleet data model (scaling-group instances, cluster
//! membership, member drain status), the capability interfaces the
//! migration core consumes, and the `rotor.toml` configuration record.
//!
//! # Modules
//!
//! - **`types`** — `GroupInstance`, `ClusterMembership`, `MemberStatus`
//! - **`fleet`** — `FleetDirectory`, `ClusterRegistry`, `TerminationClient`
//! - **`progress`** — operator-visible line stream
//! - **`config`** — `RotorConfig`, `MigrationConfig`, `CloudConfig`
//! - **`error`** — `ApiError` for capability calls

pub mod config;
pub mod error;
pub mod fleet;
pub mod progress;
pub mod types;

pub use config::{CloudConfig, MigrationConfig, RotorConfig, SimulationConfig};
pub use error::{ApiError, ApiResult};
pub use fleet::{BoxFuture, ClusterRegistry, FleetDirectory, TerminationClient};
pub use progress::{CaptureBuffer, Progress};
pub use types::*;
