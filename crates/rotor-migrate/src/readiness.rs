//! Readiness evaluator — decides whether an instance counts as healthy.
//!
//! Ready means in service and healthy in the scaling group and, when a
//! cluster is configured, registered in a freshly fetched membership.

use std::collections::HashSet;
use std::sync::Arc;

use rotor_core::{ApiResult, ClusterMembership, ClusterRegistry, GroupInstance, InstanceId};

/// Readiness of one instance against an optional cluster membership.
pub fn is_ready(instance: &GroupInstance, membership: Option<&ClusterMembership>) -> bool {
    if !instance.is_in_service() {
        return false;
    }
    match membership {
        Some(m) => m.contains(&instance.instance_id),
        None => true,
    }
}

/// Evaluates readiness, fetching cluster membership when a cluster is set.
#[derive(Clone)]
pub struct ReadinessEvaluator {
    registry: Arc<dyn ClusterRegistry>,
    cluster: Option<String>,
}

impl ReadinessEvaluator {
    pub fn new(registry: Arc<dyn ClusterRegistry>, cluster: Option<&str>) -> Self {
        Self {
            registry,
            cluster: cluster.map(str::to_string),
        }
    }

    /// Whether a single instance is ready right now.
    pub async fn is_ready(&self, instance: &GroupInstance) -> ApiResult<bool> {
        let membership = self.membership().await?;
        Ok(is_ready(instance, membership.as_ref()))
    }

    /// IDs of the ready instances in a listing. One membership fetch per call.
    pub async fn evaluate(&self, instances: &[GroupInstance]) -> ApiResult<HashSet<InstanceId>> {
        let membership = self.membership().await?;
        Ok(instances
            .iter()
            .filter(|i| is_ready(i, membership.as_ref()))
            .map(|i| i.instance_id.clone())
            .collect())
    }

    async fn membership(&self) -> ApiResult<Option<ClusterMembership>> {
        match &self.cluster {
            Some(cluster) => Ok(Some(self.registry.list_member_instances(cluster).await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use rotor_core::{ApiError, BoxFuture, HealthStatus, LifecycleState, MemberStatus};

    struct FixedRegistry {
        members: ClusterMembership,
        fail: bool,
        calls: AtomicU32,
    }

    impl ClusterRegistry for FixedRegistry {
        fn list_member_instances<'a>(&'a self, _cluster: &'a str) -> BoxFuture<'a, ApiResult<ClusterMembership>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if self.fail {
                Err(ApiError::request("list members", "throttled"))
            } else {
                Ok(self.members.clone())
            };
            Box::pin(async move { result })
        }

        fn describe_members<'a>(
            &'a self,
            _cluster: &'a str,
            _member_ids: &'a [String],
        ) -> BoxFuture<'a, ApiResult<Vec<MemberStatus>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn request_drain<'a>(&'a self, _cluster: &'a str, _member_ids: &'a [String]) -> BoxFuture<'a, ApiResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn registry(fail: bool) -> Arc<FixedRegistry> {
        let mut members = ClusterMembership::new();
        members.insert("i-registered", "arn:1");
        Arc::new(FixedRegistry {
            members,
            fail,
            calls: AtomicU32::new(0),
        })
    }

    fn in_service(id: &str) -> GroupInstance {
        GroupInstance::new(id, LifecycleState::InService, HealthStatus::Healthy)
    }

    #[test]
    fn pure_readiness() {
        let mut membership = ClusterMembership::new();
        membership.insert("i-1", "arn:1");

        assert!(is_ready(&in_service("i-1"), None));
        assert!(is_ready(&in_service("i-1"), Some(&membership)));
        assert!(!is_ready(&in_service("i-2"), Some(&membership)));

        let pending = GroupInstance::new("i-1", LifecycleState::Pending, HealthStatus::Healthy);
        assert!(!is_ready(&pending, Some(&membership)));
    }

    #[tokio::test]
    async fn without_cluster_no_registry_calls() {
        let reg = registry(true);
        let evaluator = ReadinessEvaluator::new(reg.clone(), None);
        assert!(evaluator.is_ready(&in_service("i-x")).await.unwrap());
        assert_eq!(reg.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cluster_requires_registration() {
        let reg = registry(false);
        let evaluator = ReadinessEvaluator::new(reg.clone(), Some("apps"));
        let listing = vec![
            in_service("i-registered"),
            in_service("i-unregistered"),
            GroupInstance::new("i-sick", LifecycleState::InService, HealthStatus::Unhealthy),
        ];

        let ready = evaluator.evaluate(&listing).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert!(ready.contains("i-registered"));
        // One fetch for the whole listing.
        assert_eq!(reg.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn membership_failure_propagates() {
        let evaluator = ReadinessEvaluator::new(registry(true), Some("apps"));
        assert!(evaluator.evaluate(&[in_service("i-registered")]).await.is_err());
    }
}
