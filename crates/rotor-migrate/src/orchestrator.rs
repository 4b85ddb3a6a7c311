//! Orchestrator — the coordinating loop of a migration.
//!
//! One loop owns the `MigrationSession` and reacts to: free admission
//! tokens, pipeline entries, finished drains, stage failures, and the
//! periodic reconciliation tick. Drain tasks and retry timers never
//! touch the session; they only send `StageEvent`s back to the loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use rotor_core::{
    ApiResult, ClusterMembership, ClusterRegistry, FleetDirectory, GroupInstance, InstanceId,
    MigrationConfig, Progress, TerminationClient,
};
use rotor_drain::{DrainError, DrainProtocol, DrainTarget};

use crate::error::{MigrateError, MigrateResult};
use crate::readiness::ReadinessEvaluator;
use crate::session::MigrationSession;

/// What to migrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    pub group: String,
    /// Cluster whose members are drained first. `None` disables draining
    /// and registration checks.
    pub cluster: Option<String>,
    /// Share of the group (0-100) that must stay healthy.
    pub min_healthy_percent: u32,
}

/// Outcome of a successful migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub instances: u32,
    pub max_in_flight: u32,
    pub terminated: u32,
    pub replacements: u32,
    pub elapsed: Duration,
}

/// Stage a failed instance is resubmitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Enter,
    Terminate,
}

/// Messages into the coordinating loop.
#[derive(Debug)]
enum StageEvent {
    Drained(InstanceId),
    DrainFailed(DrainError),
    Resubmit { stage: Stage, instance_id: InstanceId },
}

/// Drives migrations against the fleet and cluster services.
pub struct Orchestrator {
    fleet: Arc<dyn FleetDirectory>,
    registry: Arc<dyn ClusterRegistry>,
    terminator: Arc<dyn TerminationClient>,
    config: MigrationConfig,
    progress: Progress,
}

/// Per-run plumbing shared by the event handlers.
struct Pipeline {
    membership: ClusterMembership,
    cluster: Option<String>,
    drain: DrainProtocol,
    events: mpsc::UnboundedSender<StageEvent>,
    tasks: JoinSet<()>,
}

impl Orchestrator {
    pub fn new(
        fleet: Arc<dyn FleetDirectory>,
        registry: Arc<dyn ClusterRegistry>,
        terminator: Arc<dyn TerminationClient>,
        config: MigrationConfig,
        progress: Progress,
    ) -> Self {
        Self {
            fleet,
            registry,
            terminator,
            config,
            progress,
        }
    }

    /// Replace every instance of the group. Fatal errors are also written
    /// to the progress stream as its final line.
    pub async fn migrate(&self, request: &MigrationRequest) -> MigrateResult<MigrationSummary> {
        match self.run(request).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                self.progress.error(&e);
                Err(e)
            }
        }
    }

    async fn run(&self, request: &MigrationRequest) -> MigrateResult<MigrationSummary> {
        if request.min_healthy_percent > 100 {
            return Err(MigrateError::InvalidArgument(format!(
                "minimum healthy percentage must be between 0 and 100, got {}",
                request.min_healthy_percent
            )));
        }

        let group = request.group.as_str();
        let instances = self
            .fleet
            .list_group_instances(group)
            .await
            .map_err(|e| MigrateError::from_listing(group, e))?;

        self.progress.line(format_args!("Instance count: {}", instances.len()));
        let started = Instant::now();

        if instances.is_empty() {
            info!(%group, "group is empty, nothing to migrate");
            self.progress.line("Finished.");
            return Ok(MigrationSummary {
                instances: 0,
                max_in_flight: 0,
                terminated: 0,
                replacements: 0,
                elapsed: Duration::ZERO,
            });
        }

        let mut session = MigrationSession::start(
            group,
            request.cluster.as_deref(),
            request.min_healthy_percent,
            &instances,
            started,
        )?;

        let membership = match &request.cluster {
            Some(cluster) => self
                .registry
                .list_member_instances(cluster)
                .await
                .map_err(|source| MigrateError::Cluster {
                    cluster: cluster.clone(),
                    source,
                })?,
            None => ClusterMembership::new(),
        };

        self.progress.line(format_args!(
            "Migrating {} instances, max in flight: {}",
            session.total(),
            session.max_in_flight()
        ));

        let (events, mut inbox) = mpsc::unbounded_channel();
        let mut pipeline = Pipeline {
            membership,
            cluster: request.cluster.clone(),
            drain: DrainProtocol::new(self.registry.clone(), &self.config, self.progress.clone()),
            events,
            tasks: JoinSet::new(),
        };
        let readiness = ReadinessEvaluator::new(self.registry.clone(), request.cluster.as_deref());

        let tick = self.config.tick_interval();
        let mut ticker = tokio::time::interval_at(started + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            while let Some(instance_id) = session.admit_next(Instant::now()) {
                self.enter_pipeline(&mut session, &mut pipeline, instance_id).await;
            }

            tokio::select! {
                Some(event) = inbox.recv() => {
                    self.handle_event(&mut session, &mut pipeline, event).await;
                }

                _ = ticker.tick() => {
                    if let Some(summary) = self.reconcile(&mut session, &readiness).await {
                        return Ok(summary);
                    }
                    if let Some(idle) = session.stalled(Instant::now(), self.config.stall_timeout()) {
                        warn!(%group, idle_secs = idle.as_secs(), "migration stalled");
                        return Err(MigrateError::Stalled { idle });
                    }
                }

                Some(joined) = pipeline.tasks.join_next(), if !pipeline.tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!(%group, error = %e, "pipeline task failed");
                    }
                }
            }
        }
    }

    /// Route an instance into draining, or straight to termination when it
    /// is not a cluster member.
    async fn enter_pipeline(
        &self,
        session: &mut MigrationSession,
        pipeline: &mut Pipeline,
        instance_id: InstanceId,
    ) {
        let member = pipeline
            .cluster
            .as_deref()
            .and_then(|cluster| Some((cluster, pipeline.membership.member_for(&instance_id)?)));

        let Some((cluster, member_id)) = member else {
            debug!(group = %session.group(), %instance_id, "not a cluster member, skipping drain");
            self.terminate(session, pipeline, instance_id).await;
            return;
        };

        let target = DrainTarget {
            instance_id,
            member_id: member_id.to_string(),
            cluster: cluster.to_string(),
        };
        let drain = pipeline.drain.clone();
        let events = pipeline.events.clone();
        pipeline.tasks.spawn(async move {
            let event = match drain.run(&target).await {
                Ok(report) => StageEvent::Drained(report.instance_id),
                Err(e) => StageEvent::DrainFailed(e),
            };
            let _ = events.send(event);
        });
    }

    async fn handle_event(&self, session: &mut MigrationSession, pipeline: &mut Pipeline, event: StageEvent) {
        match event {
            StageEvent::Drained(instance_id) => {
                session.mark_progress(Instant::now());
                self.terminate(session, pipeline, instance_id).await;
            }
            StageEvent::DrainFailed(err) => {
                let instance_id = err.instance_id().to_string();
                self.report(session, &err);
                self.resubmit(pipeline, Stage::Enter, instance_id);
            }
            StageEvent::Resubmit { stage, instance_id } => {
                if !session.is_in_flight(&instance_id) {
                    debug!(group = %session.group(), %instance_id, "instance already gone, dropping retry");
                    return;
                }
                match stage {
                    Stage::Enter => self.enter_pipeline(session, pipeline, instance_id).await,
                    Stage::Terminate => self.terminate(session, pipeline, instance_id).await,
                }
            }
        }
    }

    /// Terminate without decrementing desired capacity, so the group
    /// launches a replacement immediately.
    async fn terminate(&self, session: &mut MigrationSession, pipeline: &mut Pipeline, instance_id: InstanceId) {
        self.progress.line(format_args!("Terminating {instance_id}"));
        match self.terminator.terminate(&instance_id, false).await {
            Ok(()) => {
                session.record_terminated(Instant::now());
                info!(group = %session.group(), %instance_id, "termination requested");
            }
            Err(e) => {
                self.report(session, format_args!("failed to terminate {instance_id}: {e}"));
                self.resubmit(pipeline, Stage::Terminate, instance_id);
            }
        }
    }

    /// Send an instance back to `stage` after the retry delay.
    fn resubmit(&self, pipeline: &mut Pipeline, stage: Stage, instance_id: InstanceId) {
        let delay = self.config.retry_delay();
        let events = pipeline.events.clone();
        pipeline.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(StageEvent::Resubmit { stage, instance_id });
        });
    }

    /// One reconciliation tick. Returns the summary once the migration is complete.
    async fn reconcile(
        &self,
        session: &mut MigrationSession,
        readiness: &ReadinessEvaluator,
    ) -> Option<MigrationSummary> {
        let (live, ready) = match self.observe(session.group(), readiness).await {
            Ok(observed) => observed,
            Err(e) => {
                self.report(session, format_args!("failed to refresh group state, retrying: {e}"));
                return None;
            }
        };

        let now = Instant::now();
        let r = session.reconcile(&live, &ready, now);

        for instance_id in &r.confirmed_gone {
            info!(group = %session.group(), %instance_id, "instance left the group");
        }
        for instance_id in &r.newly_healthy {
            self.progress.line(format_args!("New instance is in service: {instance_id}"));
            info!(group = %session.group(), %instance_id, "replacement in service");
        }
        debug!(
            group = %session.group(),
            live = r.live,
            healthy = r.healthy,
            remaining_old = r.remaining_old,
            unavailable = r.unavailable,
            released = r.released,
            "reconciled"
        );

        if !r.complete {
            return None;
        }

        self.progress.line("Finished.");
        let summary = MigrationSummary {
            instances: session.total(),
            max_in_flight: session.max_in_flight(),
            terminated: session.terminated(),
            replacements: session.replacements(),
            elapsed: now.saturating_duration_since(session.started_at()),
        };
        info!(
            group = %session.group(),
            terminated = summary.terminated,
            elapsed_secs = summary.elapsed.as_secs(),
            "migration finished"
        );
        Some(summary)
    }

    async fn observe(
        &self,
        group: &str,
        readiness: &ReadinessEvaluator,
    ) -> ApiResult<(Vec<GroupInstance>, HashSet<InstanceId>)> {
        let live = self.fleet.list_group_instances(group).await?;
        let ready = readiness.evaluate(&live).await?;
        Ok((live, ready))
    }

    /// Report a non-fatal error. The session carries on.
    fn report(&self, session: &MigrationSession, message: impl std::fmt::Display) {
        self.progress.error(&message);
        warn!(group = %session.group(), error = %message, "non-fatal migration error");
    }
}
