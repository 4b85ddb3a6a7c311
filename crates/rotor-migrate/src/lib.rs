//! rotor-migrate — rolling replacement of every instance in a scaling group.
//!
//! The orchestrator takes the group's instances out of service a few at a
//! time, drains cluster members first, terminates them without lowering
//! desired capacity, and waits for replacements to become ready before
//! admitting more.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator (single coordinating loop)
//!   ├── MigrationSession (sole owner of admission tokens and progress)
//!   ├── Admission: FIFO over the starting snapshot, one token per instance
//!   ├── Drain tasks (rotor-drain) ──message──▶ coordinator
//!   ├── Termination (inline, resubmitted on failure)
//!   └── Reconciliation tick
//!       ├── FleetDirectory listing + ReadinessEvaluator
//!       ├── token release bounded by max_in_flight
//!       └── completion / stall detection
//! ```
//!
//! # Components
//!
//! - **`capacity`** — `max_in_flight` and the per-tick token release rule
//! - **`readiness`** — when an instance counts as ready
//! - **`session`** — the migration session state
//! - **`orchestrator`** — the event loop

pub mod capacity;
pub mod error;
pub mod orchestrator;
pub mod readiness;
pub mod session;

pub use capacity::{TokenRelease, max_in_flight};
pub use error::{MigrateError, MigrateResult};
pub use orchestrator::{MigrationRequest, MigrationSummary, Orchestrator};
pub use readiness::{ReadinessEvaluator, is_ready};
pub use session::{MigrationSession, Reconciliation};
