//! rotor-sim — an in-memory scaling group and container cluster.
//!
//! `SimFleet` implements `FleetDirectory`, `ClusterRegistry` and
//! `TerminationClient` on top of the tokio clock, so migrations can be
//! exercised end to end under `tokio::time::pause`.
//!
//! # Behavior
//!
//! - Terminating an instance (without decrementing desired capacity)
//!   marks it `Terminating`, removes it after `terminate_delay_secs`, and
//!   launches a `Pending` replacement that comes into service after
//!   `launch_delay_secs`.
//! - With a cluster configured, replacements register as members
//!   `register_delay_secs` after coming into service.
//! - A draining member keeps its tasks for `drain_delay_secs` unless it
//!   was marked stuck.
//! - The next N calls of any kind can be made to fail.
//!
//! Every call samples unavailable capacity (desired minus in-service,
//! healthy, non-draining instances) and keeps the peak.

pub mod fleet;

pub use fleet::{CallCounts, SimFleet};
