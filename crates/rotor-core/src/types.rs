//! Domain types for scaling groups and container clusters.
//!
//! Every value here is an immutable snapshot: a fresh query produces new
//! values that replace the old ones wholesale.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cloud instance identifier (e.g. `i-0abc…`).
pub type InstanceId = String;

/// Cluster-side identifier of a registered instance (container instance ARN).
pub type MemberId = String;

// ── Scaling group ──────────────────────────────────────────────────

/// Lifecycle state of an instance inside a scaling group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Pending,
    PendingWait,
    PendingProceed,
    Quarantined,
    InService,
    Terminating,
    TerminatingWait,
    TerminatingProceed,
    Terminated,
    Detaching,
    Detached,
    EnteringStandby,
    Standby,
}

impl LifecycleState {
    /// True for every state on the way out of the group.
    pub fn is_terminating(self) -> bool {
        matches!(
            self,
            Self::Terminating
                | Self::TerminatingWait
                | Self::TerminatingProceed
                | Self::Terminated
        )
    }
}

/// Health status reported by the scaling group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// One instance as seen in a scaling-group listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupInstance {
    pub instance_id: InstanceId,
    pub lifecycle_state: LifecycleState,
    pub health_status: HealthStatus,
}

impl GroupInstance {
    pub fn new(instance_id: &str, lifecycle_state: LifecycleState, health_status: HealthStatus) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            lifecycle_state,
            health_status,
        }
    }

    /// In service and reported healthy by the group.
    pub fn is_in_service(&self) -> bool {
        self.lifecycle_state == LifecycleState::InService
            && self.health_status == HealthStatus::Healthy
    }
}

// ── Cluster ────────────────────────────────────────────────────────

/// Registration records of one cluster: instance ID → member ID.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterMembership {
    members: HashMap<InstanceId, MemberId>,
}

impl ClusterMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instance_id: &str, member_id: &str) {
        self.members
            .insert(instance_id.to_string(), member_id.to_string());
    }

    /// Member ID registered for `instance_id`, if any.
    pub fn member_for(&self, instance_id: &str) -> Option<&str> {
        self.members.get(instance_id).map(String::as_str)
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.members.contains_key(instance_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl FromIterator<(InstanceId, MemberId)> for ClusterMembership {
    fn from_iter<I: IntoIterator<Item = (InstanceId, MemberId)>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

/// Scheduling state of a cluster member.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemberState {
    Registering,
    Active,
    Draining,
    Deregistering,
    Inactive,
}

/// Current status of a cluster member as returned by a describe call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberStatus {
    pub member_id: MemberId,
    pub instance_id: InstanceId,
    pub state: MemberState,
    pub running_tasks: u32,
    pub pending_tasks: u32,
}

impl MemberStatus {
    /// Draining with no running or pending work left.
    pub fn is_drained(&self) -> bool {
        self.state == MemberState::Draining && self.running_tasks == 0 && self.pending_tasks == 0
    }
}
