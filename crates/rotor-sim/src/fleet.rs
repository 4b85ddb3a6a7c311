//! Simulated fleet state and the capability implementations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use rotor_core::{
    ApiError, ApiResult, BoxFuture, ClusterMembership, ClusterRegistry, FleetDirectory,
    GroupInstance, HealthStatus, LifecycleState, MemberState, MemberStatus, SimulationConfig,
    TerminationClient,
};

/// Number of calls received per capability operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_group: u32,
    pub list_members: u32,
    pub describe_members: u32,
    pub request_drain: u32,
    pub terminate: u32,
}

impl CallCounts {
    /// Calls that mutate the fleet or cluster.
    pub fn side_effects(&self) -> u32 {
        self.request_drain + self.terminate
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    list_group: u32,
    list_members: u32,
    describe_members: u32,
    request_drain: u32,
    terminate: u32,
}

#[derive(Debug, Clone)]
struct SimInstance {
    instance_id: String,
    in_service_at: Instant,
    registered_at: Option<Instant>,
    terminating_at: Option<Instant>,
    drain_requested_at: Option<Instant>,
    unhealthy: bool,
    stuck: bool,
}

impl SimInstance {
    fn member_id(&self) -> String {
        member_id_for(&self.instance_id)
    }

    fn lifecycle(&self, now: Instant) -> LifecycleState {
        if self.terminating_at.is_some() {
            LifecycleState::Terminating
        } else if now < self.in_service_at {
            LifecycleState::Pending
        } else {
            LifecycleState::InService
        }
    }

    fn health(&self) -> HealthStatus {
        if self.unhealthy {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        }
    }

    fn is_registered(&self, now: Instant) -> bool {
        self.registered_at.is_some_and(|at| now >= at)
    }

    fn is_serving(&self, now: Instant) -> bool {
        self.lifecycle(now) == LifecycleState::InService
            && !self.unhealthy
            && self.drain_requested_at.is_none()
    }
}

#[derive(Debug)]
struct SimState {
    instances: Vec<SimInstance>,
    desired: u32,
    next_replacement: u32,
    faults: Faults,
    calls: CallCounts,
    peak_unavailable: u32,
    terminated: Vec<String>,
}

impl SimState {
    /// Apply time-driven transitions and sample unavailable capacity.
    fn advance(&mut self, now: Instant, terminate_delay: Duration) {
        self.instances
            .retain(|i| i.terminating_at.is_none_or(|at| now < at + terminate_delay));

        let serving = self.instances.iter().filter(|i| i.is_serving(now)).count() as u32;
        let unavailable = self.desired.saturating_sub(serving);
        self.peak_unavailable = self.peak_unavailable.max(unavailable);
    }

    fn find_mut(&mut self, instance_id: &str) -> Option<&mut SimInstance> {
        self.instances.iter_mut().find(|i| i.instance_id == instance_id)
    }
}

fn member_id_for(instance_id: &str) -> String {
    format!("arn:sim:container-instance/{instance_id}")
}

/// Consume one injected fault, if any are left.
fn take_fault(remaining: &mut u32) -> bool {
    if *remaining > 0 {
        *remaining -= 1;
        true
    } else {
        false
    }
}

/// A scaling group, optionally backing a container cluster.
#[derive(Debug, Clone)]
pub struct SimFleet {
    group: String,
    cluster: Option<String>,
    config: SimulationConfig,
    state: Arc<Mutex<SimState>>,
}

impl SimFleet {
    /// A group of `instances` in-service, healthy instances.
    pub fn new(group: &str, instances: u32, config: SimulationConfig) -> Self {
        let now = Instant::now();
        let instances = (0..instances)
            .map(|n| SimInstance {
                instance_id: format!("i-sim-{n:04}"),
                in_service_at: now,
                registered_at: None,
                terminating_at: None,
                drain_requested_at: None,
                unhealthy: false,
                stuck: false,
            })
            .collect::<Vec<_>>();
        let desired = instances.len() as u32;

        Self {
            group: group.to_string(),
            cluster: None,
            config,
            state: Arc::new(Mutex::new(SimState {
                instances,
                desired,
                next_replacement: 0,
                faults: Faults::default(),
                calls: CallCounts::default(),
                peak_unavailable: 0,
                terminated: Vec::new(),
            })),
        }
    }

    /// Register every current instance as a member of `cluster`.
    pub fn with_cluster(mut self, cluster: &str) -> Self {
        let now = Instant::now();
        self.cluster = Some(cluster.to_string());
        for inst in &mut self.lock().instances {
            inst.registered_at = Some(now);
        }
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    pub fn fail_next_list(&self, n: u32) {
        self.lock().faults.list_group += n;
    }

    pub fn fail_next_members(&self, n: u32) {
        self.lock().faults.list_members += n;
    }

    pub fn fail_next_describe(&self, n: u32) {
        self.lock().faults.describe_members += n;
    }

    pub fn fail_next_drain(&self, n: u32) {
        self.lock().faults.request_drain += n;
    }

    pub fn fail_next_terminate(&self, n: u32) {
        self.lock().faults.terminate += n;
    }

    /// Keep the instance's tasks running forever once draining.
    pub fn mark_stuck(&self, instance_id: &str) {
        if let Some(inst) = self.lock().find_mut(instance_id) {
            inst.stuck = true;
        }
    }

    pub fn mark_unhealthy(&self, instance_id: &str) {
        if let Some(inst) = self.lock().find_mut(instance_id) {
            inst.unhealthy = true;
        }
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Highest unavailable capacity observed on any call.
    pub fn peak_unavailable(&self) -> u32 {
        self.lock().peak_unavailable
    }

    /// Instances whose termination was accepted, in call order.
    pub fn terminated(&self) -> Vec<String> {
        self.lock().terminated.clone()
    }

    /// IDs currently listed in the group.
    pub fn instance_ids(&self) -> Vec<String> {
        let mut state = self.lock();
        state.advance(Instant::now(), self.terminate_delay());
        state.instances.iter().map(|i| i.instance_id.clone()).collect()
    }

    fn terminate_delay(&self) -> Duration {
        Duration::from_secs(self.config.terminate_delay_secs)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock and bring the state up to `now`.
    fn at_now(&self) -> (MutexGuard<'_, SimState>, Instant) {
        let now = Instant::now();
        let mut state = self.lock();
        state.advance(now, self.terminate_delay());
        (state, now)
    }

    fn check_cluster(&self, cluster: &str, operation: &str) -> ApiResult<()> {
        match &self.cluster {
            Some(c) if c == cluster => Ok(()),
            _ => Err(ApiError::request(operation, format!("cluster not found: {cluster}"))),
        }
    }

    fn do_list_group(&self, group: &str) -> ApiResult<Vec<GroupInstance>> {
        let (mut state, now) = self.at_now();
        state.calls.list_group += 1;
        if take_fault(&mut state.faults.list_group) {
            return Err(ApiError::request("describe auto scaling groups", "injected failure"));
        }
        if group != self.group {
            return Err(ApiError::GroupNotFound(group.to_string()));
        }
        Ok(state
            .instances
            .iter()
            .map(|i| GroupInstance::new(&i.instance_id, i.lifecycle(now), i.health()))
            .collect())
    }

    fn do_list_members(&self, cluster: &str) -> ApiResult<ClusterMembership> {
        let (mut state, now) = self.at_now();
        state.calls.list_members += 1;
        if take_fault(&mut state.faults.list_members) {
            return Err(ApiError::request("list container instances", "injected failure"));
        }
        self.check_cluster(cluster, "list container instances")?;
        Ok(state
            .instances
            .iter()
            .filter(|i| i.is_registered(now))
            .map(|i| (i.instance_id.clone(), i.member_id()))
            .collect())
    }

    fn do_describe(&self, cluster: &str, member_ids: &[String]) -> ApiResult<Vec<MemberStatus>> {
        let (mut state, now) = self.at_now();
        state.calls.describe_members += 1;
        if take_fault(&mut state.faults.describe_members) {
            return Err(ApiError::request("describe container instances", "injected failure"));
        }
        self.check_cluster(cluster, "describe container instances")?;

        let drain_delay = Duration::from_secs(self.config.drain_delay_secs);
        let tasks = self.config.tasks_per_instance;
        Ok(state
            .instances
            .iter()
            .filter(|i| i.is_registered(now) && member_ids.contains(&i.member_id()))
            .map(|i| {
                let (member_state, running) = match i.drain_requested_at {
                    Some(at) if !i.stuck && now >= at + drain_delay => (MemberState::Draining, 0),
                    Some(_) => (MemberState::Draining, tasks),
                    None => (MemberState::Active, tasks),
                };
                MemberStatus {
                    member_id: i.member_id(),
                    instance_id: i.instance_id.clone(),
                    state: member_state,
                    running_tasks: running,
                    pending_tasks: 0,
                }
            })
            .collect())
    }

    fn do_request_drain(&self, cluster: &str, member_ids: &[String]) -> ApiResult<()> {
        let (mut state, now) = self.at_now();
        state.calls.request_drain += 1;
        if take_fault(&mut state.faults.request_drain) {
            return Err(ApiError::request("update container instances state", "injected failure"));
        }
        self.check_cluster(cluster, "update container instances state")?;

        for inst in state.instances.iter_mut() {
            if inst.is_registered(now) && member_ids.contains(&inst.member_id()) {
                inst.drain_requested_at.get_or_insert(now);
                debug!(instance_id = %inst.instance_id, "sim: draining");
            }
        }
        state.advance(now, self.terminate_delay());
        Ok(())
    }

    fn do_terminate(&self, instance_id: &str, decrement_desired_capacity: bool) -> ApiResult<()> {
        let (mut state, now) = self.at_now();
        state.calls.terminate += 1;
        if take_fault(&mut state.faults.terminate) {
            return Err(ApiError::request("terminate instance", "injected failure"));
        }

        let Some(inst) = state.find_mut(instance_id).filter(|i| i.terminating_at.is_none()) else {
            return Err(ApiError::request(
                "terminate instance",
                format!("instance not found: {instance_id}"),
            ));
        };
        inst.terminating_at = Some(now);
        state.terminated.push(instance_id.to_string());

        if decrement_desired_capacity {
            state.desired = state.desired.saturating_sub(1);
        } else {
            let in_service_at = now + Duration::from_secs(self.config.launch_delay_secs);
            let registered_at = self
                .cluster
                .as_ref()
                .map(|_| in_service_at + Duration::from_secs(self.config.register_delay_secs));
            let n = state.next_replacement;
            state.next_replacement += 1;
            let replacement = format!("i-sim-new-{n:04}");
            debug!(%instance_id, %replacement, "sim: terminating, replacement launched");
            state.instances.push(SimInstance {
                instance_id: replacement,
                in_service_at,
                registered_at,
                terminating_at: None,
                drain_requested_at: None,
                unhealthy: false,
                stuck: false,
            });
        }
        state.advance(now, self.terminate_delay());
        Ok(())
    }
}

impl FleetDirectory for SimFleet {
    fn list_group_instances<'a>(&'a self, group: &'a str) -> BoxFuture<'a, ApiResult<Vec<GroupInstance>>> {
        let result = self.do_list_group(group);
        Box::pin(async move { result })
    }
}

impl ClusterRegistry for SimFleet {
    fn list_member_instances<'a>(&'a self, cluster: &'a str) -> BoxFuture<'a, ApiResult<ClusterMembership>> {
        let result = self.do_list_members(cluster);
        Box::pin(async move { result })
    }

    fn describe_members<'a>(
        &'a self,
        cluster: &'a str,
        member_ids: &'a [String],
    ) -> BoxFuture<'a, ApiResult<Vec<MemberStatus>>> {
        let result = self.do_describe(cluster, member_ids);
        Box::pin(async move { result })
    }

    fn request_drain<'a>(&'a self, cluster: &'a str, member_ids: &'a [String]) -> BoxFuture<'a, ApiResult<()>> {
        let result = self.do_request_drain(cluster, member_ids);
        Box::pin(async move { result })
    }
}

impl TerminationClient for SimFleet {
    fn terminate<'a>(
        &'a self,
        instance_id: &'a str,
        decrement_desired_capacity: bool,
    ) -> BoxFuture<'a, ApiResult<()>> {
        let result = self.do_terminate(instance_id, decrement_desired_capacity);
        Box::pin(async move { result })
    }
}
