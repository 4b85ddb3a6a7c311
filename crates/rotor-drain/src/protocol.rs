//! Drain protocol — per-instance draining with polling and a hard timeout.
//!
//! `DrainMachine` is the pure state machine; `DrainProtocol` drives it
//! against a `ClusterRegistry` on a fixed poll cadence.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use rotor_core::{ApiError, ApiResult, ClusterRegistry, MemberStatus, MigrationConfig, Progress};

use crate::error::{DrainError, DrainResult};

/// State of one drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Drain about to be requested.
    Requested,
    /// Member marked draining, waiting for its work to finish.
    Draining,
    /// No running or pending work left. Terminal.
    Drained,
    /// Timeout elapsed before the member went idle. Terminal.
    TimedOut,
}

/// The member to drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainTarget {
    pub instance_id: String,
    pub member_id: String,
    pub cluster: String,
}

/// Outcome of a successful drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub instance_id: String,
    pub polls: u32,
    pub failed_polls: u32,
    pub elapsed: Duration,
}

/// Pure drain state machine, advanced by poll results.
#[derive(Debug, Clone)]
pub struct DrainMachine {
    member_id: String,
    state: DrainState,
    polls: u32,
    failed_polls: u32,
}

impl DrainMachine {
    pub fn new(member_id: &str) -> Self {
        Self {
            member_id: member_id.to_string(),
            state: DrainState::Requested,
            polls: 0,
            failed_polls: 0,
        }
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn failed_polls(&self) -> u32 {
        self.failed_polls
    }

    /// The drain request was accepted.
    pub fn requested(&mut self) {
        if self.state == DrainState::Requested {
            self.state = DrainState::Draining;
        }
    }

    /// Feed one poll result.
    ///
    /// A failed poll, or a response without our member, leaves the state
    /// unchanged and is returned so the caller can report it.
    pub fn observe(&mut self, poll: ApiResult<Vec<MemberStatus>>) -> Result<DrainState, ApiError> {
        if self.state != DrainState::Draining {
            return Ok(self.state);
        }
        self.polls += 1;

        let statuses = match poll {
            Ok(s) => s,
            Err(e) => {
                self.failed_polls += 1;
                return Err(e);
            }
        };

        let Some(status) = statuses.iter().find(|s| s.member_id == self.member_id) else {
            self.failed_polls += 1;
            return Err(ApiError::request(
                "describe members",
                format!("member {} missing from response", self.member_id),
            ));
        };

        if status.is_drained() {
            self.state = DrainState::Drained;
        }
        Ok(self.state)
    }

    /// The hard timeout elapsed.
    pub fn time_out(&mut self) {
        if self.state != DrainState::Drained {
            self.state = DrainState::TimedOut;
        }
    }
}

/// Runs drains against a cluster registry.
#[derive(Clone)]
pub struct DrainProtocol {
    registry: Arc<dyn ClusterRegistry>,
    poll_interval: Duration,
    timeout: Duration,
    progress: Progress,
}

impl DrainProtocol {
    pub fn new(registry: Arc<dyn ClusterRegistry>, config: &MigrationConfig, progress: Progress) -> Self {
        Self {
            registry,
            poll_interval: config.drain_poll_interval(),
            timeout: config.drain_timeout(),
            progress,
        }
    }

    /// Drain one member. Resolves once it is drained or the timeout elapses.
    pub async fn run(&self, target: &DrainTarget) -> DrainResult<DrainReport> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let member_ids = [target.member_id.clone()];
        let mut machine = DrainMachine::new(&target.member_id);

        self.progress.line(format_args!(
            "Draining {} in cluster {}",
            target.instance_id, target.cluster
        ));
        info!(instance_id = %target.instance_id, cluster = %target.cluster, "requesting drain");

        self.registry
            .request_drain(&target.cluster, &member_ids)
            .await
            .map_err(|e| DrainError::Request {
                instance_id: target.instance_id.clone(),
                cluster: target.cluster.clone(),
                message: e.to_string(),
            })?;
        machine.requested();

        let mut ticker = tokio::time::interval_at(started + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = tokio::time::sleep_until(deadline) => {
                    machine.time_out();
                    let elapsed = started.elapsed();
                    warn!(
                        instance_id = %target.instance_id,
                        cluster = %target.cluster,
                        elapsed_secs = elapsed.as_secs(),
                        polls = machine.polls(),
                        "drain timed out"
                    );
                    return Err(DrainError::TimedOut {
                        instance_id: target.instance_id.clone(),
                        cluster: target.cluster.clone(),
                        elapsed,
                    });
                }

                _ = ticker.tick() => {
                    let poll = self.registry.describe_members(&target.cluster, &member_ids).await;
                    match machine.observe(poll) {
                        Ok(DrainState::Drained) => {
                            let elapsed = started.elapsed();
                            info!(
                                instance_id = %target.instance_id,
                                cluster = %target.cluster,
                                elapsed_secs = elapsed.as_secs(),
                                "drained"
                            );
                            return Ok(DrainReport {
                                instance_id: target.instance_id.clone(),
                                polls: machine.polls(),
                                failed_polls: machine.failed_polls(),
                                elapsed,
                            });
                        }
                        Ok(_) => {
                            debug!(instance_id = %target.instance_id, "still draining");
                        }
                        Err(e) => {
                            self.progress.warning(format_args!(
                                "failed to get cluster member state for {}: {e}",
                                target.instance_id
                            ));
                            warn!(instance_id = %target.instance_id, error = %e, "drain poll failed");
                        }
                    }
                    self.progress.line(format_args!("Waiting for {} to be drained", target.instance_id));
                }
            }
        }
    }
}
