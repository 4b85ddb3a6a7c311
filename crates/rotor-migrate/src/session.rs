//! Migration session — the state one migration owns.
//!
//! The session is only ever touched by the coordinating loop. It tracks
//! which original instances are still queued, which have been admitted,
//! how many admission tokens are free, and when anything last moved
//! forward.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use rotor_core::{GroupInstance, InstanceId};

use crate::capacity::{TokenRelease, max_in_flight};
use crate::error::{MigrateError, MigrateResult};

/// Result of reconciling the session against one live listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Replacement instances seen ready for the first time.
    pub newly_healthy: Vec<InstanceId>,
    /// Admitted instances no longer present in the group.
    pub confirmed_gone: Vec<InstanceId>,
    pub live: u32,
    pub healthy: u32,
    pub remaining_old: u32,
    pub unavailable: u32,
    /// Tokens released this tick.
    pub released: u32,
    /// Every original instance is gone and the group is fully ready.
    pub complete: bool,
}

/// State of one migration.
#[derive(Debug, Clone)]
pub struct MigrationSession {
    group: String,
    cluster: Option<String>,
    min_healthy_percent: u32,
    total: u32,
    max_in_flight: u32,
    pending_old: VecDeque<InstanceId>,
    old_ids: HashSet<InstanceId>,
    /// Admitted and not yet confirmed gone.
    in_flight: HashSet<InstanceId>,
    tokens: u32,
    known_new_healthy: HashSet<InstanceId>,
    deleted_count: u32,
    terminated: u32,
    last_live: HashSet<InstanceId>,
    started_at: Instant,
    last_progress: Instant,
}

impl MigrationSession {
    /// Start a session from the group's starting snapshot.
    ///
    /// Fails when `min_healthy_percent` leaves no admission capacity.
    pub fn start(
        group: &str,
        cluster: Option<&str>,
        min_healthy_percent: u32,
        instances: &[GroupInstance],
        now: Instant,
    ) -> MigrateResult<Self> {
        if min_healthy_percent > 100 {
            return Err(MigrateError::InvalidArgument(format!(
                "minimum healthy percentage must be between 0 and 100, got {min_healthy_percent}"
            )));
        }

        let total = instances.len() as u32;
        let max_in_flight = max_in_flight(min_healthy_percent, total);
        if max_in_flight == 0 {
            return Err(MigrateError::NoCapacity {
                min_healthy_percent,
                instances: total,
            });
        }

        let pending_old: VecDeque<InstanceId> =
            instances.iter().map(|i| i.instance_id.clone()).collect();
        let old_ids: HashSet<InstanceId> = pending_old.iter().cloned().collect();

        info!(
            %group,
            instances = total,
            max_in_flight,
            min_healthy_percent,
            "migration session started"
        );

        Ok(Self {
            group: group.to_string(),
            cluster: cluster.map(str::to_string),
            min_healthy_percent,
            total,
            max_in_flight,
            last_live: old_ids.clone(),
            pending_old,
            old_ids,
            in_flight: HashSet::new(),
            tokens: max_in_flight,
            known_new_healthy: HashSet::new(),
            deleted_count: 0,
            terminated: 0,
            started_at: now,
            last_progress: now,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    pub fn min_healthy_percent(&self) -> u32 {
        self.min_healthy_percent
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    pub fn deleted_count(&self) -> u32 {
        self.deleted_count
    }

    pub fn terminated(&self) -> u32 {
        self.terminated
    }

    pub fn replacements(&self) -> u32 {
        self.known_new_healthy.len() as u32
    }

    pub fn pending(&self) -> usize {
        self.pending_old.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, instance_id: &str) -> bool {
        self.in_flight.contains(instance_id)
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Take the next queued original instance if a token is free.
    ///
    /// Instances missing from the latest listing are dropped from the
    /// queue without consuming a token.
    pub fn admit_next(&mut self, now: Instant) -> Option<InstanceId> {
        while self.tokens > 0 {
            let id = self.pending_old.pop_front()?;
            if !self.last_live.contains(&id) {
                debug!(group = %self.group, instance_id = %id, "skipping instance that already left the group");
                continue;
            }
            self.tokens -= 1;
            self.in_flight.insert(id.clone());
            self.last_progress = now;
            debug!(group = %self.group, instance_id = %id, tokens = self.tokens, "admitted");
            return Some(id);
        }
        None
    }

    /// Record a forward stage transition.
    pub fn mark_progress(&mut self, now: Instant) {
        self.last_progress = now;
    }

    /// Record an accepted termination request.
    pub fn record_terminated(&mut self, now: Instant) {
        self.terminated += 1;
        self.last_progress = now;
    }

    /// Reconcile against a fresh listing and the set of ready IDs in it.
    pub fn reconcile(
        &mut self,
        live: &[GroupInstance],
        ready: &HashSet<InstanceId>,
        now: Instant,
    ) -> Reconciliation {
        let live_ids: HashSet<InstanceId> = live.iter().map(|i| i.instance_id.clone()).collect();

        let mut confirmed_gone: Vec<InstanceId> = self
            .in_flight
            .iter()
            .filter(|id| !live_ids.contains(*id))
            .cloned()
            .collect();
        confirmed_gone.sort();
        for id in &confirmed_gone {
            self.in_flight.remove(id);
        }
        if !confirmed_gone.is_empty() {
            self.last_progress = now;
        }

        let mut newly_healthy = Vec::new();
        let mut healthy = 0u32;
        let mut available = 0u32;
        let mut remaining_old = 0u32;
        for inst in live {
            let id = &inst.instance_id;
            let is_old = self.old_ids.contains(id);
            let is_ready = ready.contains(id);
            if is_old {
                remaining_old += 1;
            }
            if is_ready {
                healthy += 1;
                if !self.in_flight.contains(id) {
                    available += 1;
                }
                if !is_old && self.known_new_healthy.insert(id.clone()) {
                    newly_healthy.push(id.clone());
                }
            }
        }
        if !newly_healthy.is_empty() {
            self.last_progress = now;
        }

        let unavailable = self.total.saturating_sub(available);
        let release = TokenRelease {
            total: self.total,
            remaining_old,
            deleted: self.deleted_count,
            unavailable,
            held: self.tokens,
            max_in_flight: self.max_in_flight,
        };
        let released = release.count();
        self.tokens += released;
        self.deleted_count += released;

        let live_count = live.len() as u32;
        let complete = remaining_old == 0 && healthy == live_count && live_count >= self.total;

        self.last_live = live_ids;

        Reconciliation {
            newly_healthy,
            confirmed_gone,
            live: live_count,
            healthy,
            remaining_old,
            unavailable,
            released,
            complete,
        }
    }

    /// How long the session has been idle, if that exceeds `limit`.
    pub fn stalled(&self, now: Instant, limit: Duration) -> Option<Duration> {
        let idle = now.saturating_duration_since(self.last_progress);
        (idle >= limit).then_some(idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotor_core::{HealthStatus, LifecycleState};

    fn in_service(id: &str) -> GroupInstance {
        GroupInstance::new(id, LifecycleState::InService, HealthStatus::Healthy)
    }

    fn pending(id: &str) -> GroupInstance {
        GroupInstance::new(id, LifecycleState::Pending, HealthStatus::Healthy)
    }

    fn fleet(n: usize) -> Vec<GroupInstance> {
        (0..n).map(|i| in_service(&format!("old-{i}"))).collect()
    }

    fn ready_of(live: &[GroupInstance]) -> HashSet<InstanceId> {
        live.iter()
            .filter(|i| i.is_in_service())
            .map(|i| i.instance_id.clone())
            .collect()
    }

    fn start(n: usize, percent: u32) -> MigrationSession {
        MigrationSession::start("web", None, percent, &fleet(n), Instant::now()).unwrap()
    }

    #[test]
    fn start_computes_capacity() {
        let s = start(10, 80);
        assert_eq!(s.max_in_flight(), 2);
        assert_eq!(s.tokens(), 2);
        assert_eq!(s.pending(), 10);
    }

    #[test]
    fn start_rejects_zero_capacity() {
        let err = MigrationSession::start("web", None, 99, &fleet(1), Instant::now()).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::NoCapacity {
                min_healthy_percent: 99,
                instances: 1
            }
        ));
    }

    #[test]
    fn start_rejects_out_of_range_percentage() {
        let err = MigrationSession::start("web", None, 101, &fleet(10), Instant::now()).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidArgument(_)));
    }

    #[test]
    fn admission_is_fifo_and_token_bounded() {
        let mut s = start(10, 80);
        let now = Instant::now();
        assert_eq!(s.admit_next(now).as_deref(), Some("old-0"));
        assert_eq!(s.admit_next(now).as_deref(), Some("old-1"));
        assert_eq!(s.admit_next(now), None);
        assert_eq!(s.in_flight(), 2);
        assert_eq!(s.pending(), 8);
    }

    #[test]
    fn tokens_follow_replacements() {
        let mut s = start(4, 50);
        let now = Instant::now();
        s.admit_next(now);
        s.admit_next(now);

        // Admitted instances still listed and healthy: nothing released.
        let live = fleet(4);
        let r = s.reconcile(&live, &ready_of(&live), now);
        assert_eq!(r.unavailable, 2);
        assert_eq!(r.released, 0);

        // Both terminated, replacements launching.
        let live = vec![in_service("old-2"), in_service("old-3"), pending("new-0"), pending("new-1")];
        let r = s.reconcile(&live, &ready_of(&live), now);
        assert_eq!(r.confirmed_gone, vec!["old-0".to_string(), "old-1".to_string()]);
        assert_eq!(r.remaining_old, 2);
        assert_eq!(r.released, 0);

        // One replacement in service.
        let live = vec![in_service("old-2"), in_service("old-3"), in_service("new-0"), pending("new-1")];
        let r = s.reconcile(&live, &ready_of(&live), now);
        assert_eq!(r.newly_healthy, vec!["new-0".to_string()]);
        assert_eq!(r.released, 1);
        assert_eq!(s.deleted_count(), 1);
        assert_eq!(s.admit_next(now).as_deref(), Some("old-2"));

        // Seen again: no duplicate notification.
        let r = s.reconcile(&live, &ready_of(&live), now);
        assert!(r.newly_healthy.is_empty());
    }

    #[test]
    fn completes_when_all_old_gone_and_group_ready() {
        let mut s = start(2, 50);
        let now = Instant::now();
        s.admit_next(now);

        let live = vec![in_service("new-0"), in_service("new-1")];
        let r = s.reconcile(&live, &ready_of(&live), now);
        assert!(r.complete);
        assert_eq!(s.replacements(), 2);
    }

    #[test]
    fn not_complete_while_replacements_missing() {
        let mut s = start(2, 50);
        let now = Instant::now();
        let live = vec![in_service("new-0")];
        let r = s.reconcile(&live, &ready_of(&live), now);
        assert!(!r.complete);
    }

    #[test]
    fn departed_instances_are_skipped_at_admission() {
        let mut s = start(3, 40);
        let now = Instant::now();
        assert_eq!(s.admit_next(now).as_deref(), Some("old-0"));

        // old-1 left on its own before being admitted.
        let live = vec![in_service("old-0"), in_service("old-2"), in_service("new-x")];
        s.reconcile(&live, &ready_of(&live), now);
        // old-0 is still admitted, so no slot opens yet.
        assert_eq!(s.tokens(), 0);

        let live = vec![in_service("old-2"), in_service("new-x"), in_service("new-y")];
        let r = s.reconcile(&live, &ready_of(&live), now);
        assert_eq!(r.released, 1);
        assert_eq!(s.admit_next(now).as_deref(), Some("old-2"));
    }

    #[test]
    fn stall_after_idle_limit() {
        let now = Instant::now();
        let s = MigrationSession::start("web", None, 50, &fleet(2), now).unwrap();
        let limit = Duration::from_secs(900);
        assert_eq!(s.stalled(now + Duration::from_secs(899), limit), None);
        assert_eq!(
            s.stalled(now + Duration::from_secs(900), limit),
            Some(Duration::from_secs(900))
        );
    }
}
