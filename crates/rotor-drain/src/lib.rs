//! rotor-drain — draining one cluster member before termination.
//!
//! The drain protocol marks a member instance as draining, then polls its
//! status until it reports zero running and pending tasks or a hard
//! timeout elapses.
//!
//! # States
//!
//! ```text
//! Requested ──request_drain──▶ Draining ──idle──▶ Drained
//!                                  │
//!                                  └──timeout──▶ TimedOut
//! ```
//!
//! Poll failures are reported as warnings and never reset the poll
//! cadence or the timeout.

pub mod error;
pub mod protocol;

pub use error::{DrainError, DrainResult};
pub use protocol::{DrainMachine, DrainProtocol, DrainReport, DrainState, DrainTarget};
