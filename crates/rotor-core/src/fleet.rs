//! Capability interfaces consumed by the migration core.
//!
//! The cloud fleet and container cluster are external services. The
//! migration core only sees them through these traits, which return
//! boxed `Send` futures so implementations can be shared as
//! `Arc<dyn …>` and moved into spawned drain tasks.

use std::future::Future;
use std::pin::Pin;

use crate::error::ApiResult;
use crate::types::{ClusterMembership, GroupInstance, MemberStatus};

/// Boxed future alias for capability calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read-only queries against the scaling group service.
pub trait FleetDirectory: Send + Sync {
    /// List the instances of a scaling group in the service's order.
    ///
    /// Fails with `ApiError::GroupNotFound` when the group does not exist.
    fn list_group_instances<'a>(&'a self, group: &'a str)
    -> BoxFuture<'a, ApiResult<Vec<GroupInstance>>>;
}

/// Queries and drain requests against the container cluster.
pub trait ClusterRegistry: Send + Sync {
    /// Registration records of every member instance in the cluster.
    fn list_member_instances<'a>(&'a self, cluster: &'a str)
    -> BoxFuture<'a, ApiResult<ClusterMembership>>;

    /// Current status of the given members.
    fn describe_members<'a>(
        &'a self,
        cluster: &'a str,
        member_ids: &'a [String],
    ) -> BoxFuture<'a, ApiResult<Vec<MemberStatus>>>;

    /// Mark the given members as draining.
    fn request_drain<'a>(&'a self, cluster: &'a str, member_ids: &'a [String])
    -> BoxFuture<'a, ApiResult<()>>;
}

/// Removes instances from a scaling group.
pub trait TerminationClient: Send + Sync {
    /// Terminate one instance. With `decrement_desired_capacity == false`
    /// the group launches a replacement straight away.
    fn terminate<'a>(
        &'a self,
        instance_id: &'a str,
        decrement_desired_capacity: bool,
    ) -> BoxFuture<'a, ApiResult<()>>;
}
