//! End-to-end migrations against the simulated fleet.
//!
//! Every test runs on a paused tokio clock, so multi-minute migrations
//! complete instantly and timer boundaries are exact.

use std::sync::Arc;
use std::time::Duration;

use rotor_core::{CaptureBuffer, MigrationConfig, Progress, SimulationConfig};
use rotor_migrate::{MigrateError, MigrationRequest, Orchestrator};
use rotor_sim::SimFleet;

fn sim_config() -> SimulationConfig {
    SimulationConfig {
        terminate_delay_secs: 15,
        launch_delay_secs: 45,
        register_delay_secs: 10,
        drain_delay_secs: 25,
        tasks_per_instance: 2,
    }
}

fn orchestrator(fleet: &SimFleet) -> (Orchestrator, CaptureBuffer) {
    let (progress, buffer) = Progress::capture();
    let shared = Arc::new(fleet.clone());
    let orchestrator = Orchestrator::new(
        shared.clone(),
        shared.clone(),
        shared,
        MigrationConfig::default(),
        progress,
    );
    (orchestrator, buffer)
}

fn request(group: &str, cluster: Option<&str>, min_healthy_percent: u32) -> MigrationRequest {
    MigrationRequest {
        group: group.to_string(),
        cluster: cluster.map(str::to_string),
        min_healthy_percent,
    }
}

fn count_lines(buffer: &CaptureBuffer, needle: &str) -> usize {
    buffer.lines().iter().filter(|l| l.contains(needle)).count()
}

#[tokio::test(start_paused = true)]
async fn empty_group_is_a_no_op() {
    let fleet = SimFleet::new("web", 0, sim_config());
    let (orchestrator, buffer) = orchestrator(&fleet);

    let summary = orchestrator.migrate(&request("web", None, 80)).await.unwrap();
    assert_eq!(summary.instances, 0);
    assert_eq!(summary.terminated, 0);
    assert_eq!(fleet.calls().side_effects(), 0);
    assert_eq!(buffer.lines().last().map(String::as_str), Some("Finished."));
}

#[tokio::test(start_paused = true)]
async fn zero_capacity_fails_before_any_other_call() {
    let fleet = SimFleet::new("web", 1, sim_config()).with_cluster("apps");
    let (orchestrator, buffer) = orchestrator(&fleet);

    let err = orchestrator
        .migrate(&request("web", Some("apps"), 99))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrateError::NoCapacity {
            min_healthy_percent: 99,
            ..
        }
    ));
    let calls = fleet.calls();
    assert_eq!(calls.list_group, 1);
    assert_eq!(calls.list_members, 0);
    assert_eq!(calls.side_effects(), 0);

    let last = buffer.lines().last().cloned().unwrap();
    assert_eq!(last, format!("Error: {err}"));
}

#[tokio::test(start_paused = true)]
async fn out_of_range_percentage_makes_no_calls() {
    let fleet = SimFleet::new("web", 4, sim_config());
    let (orchestrator, _) = orchestrator(&fleet);

    let err = orchestrator.migrate(&request("web", None, 101)).await.unwrap_err();
    assert!(matches!(err, MigrateError::InvalidArgument(_)));
    assert_eq!(fleet.calls().list_group, 0);
}

#[tokio::test(start_paused = true)]
async fn missing_group_is_fatal() {
    let fleet = SimFleet::new("web", 2, sim_config());
    let (orchestrator, buffer) = orchestrator(&fleet);

    let err = orchestrator.migrate(&request("api", None, 50)).await.unwrap_err();
    assert!(matches!(err, MigrateError::GroupNotFound(ref g) if g == "api"));
    assert_eq!(
        buffer.lines().last().map(String::as_str),
        Some("Error: auto scaling group does not exist: api")
    );
}

#[tokio::test(start_paused = true)]
async fn initial_membership_failure_is_fatal() {
    let fleet = SimFleet::new("web", 2, sim_config()).with_cluster("apps");
    fleet.fail_next_members(1);
    let (orchestrator, _) = orchestrator(&fleet);

    let err = orchestrator
        .migrate(&request("web", Some("apps"), 50))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Cluster { ref cluster, .. } if cluster == "apps"));
    assert_eq!(fleet.calls().side_effects(), 0);
}

#[tokio::test(start_paused = true)]
async fn ten_instances_two_at_a_time() {
    let fleet = SimFleet::new("web", 10, sim_config());
    let (orchestrator, buffer) = orchestrator(&fleet);

    let summary = orchestrator.migrate(&request("web", None, 80)).await.unwrap();

    assert_eq!(summary.instances, 10);
    assert_eq!(summary.max_in_flight, 2);
    assert_eq!(summary.terminated, 10);
    assert_eq!(summary.replacements, 10);
    assert_eq!(fleet.terminated().len(), 10);
    assert_eq!(fleet.calls().terminate, 10);
    assert!(
        fleet.peak_unavailable() <= 2,
        "peak unavailable was {}",
        fleet.peak_unavailable()
    );

    // Every original instance is gone.
    assert!(fleet.instance_ids().iter().all(|id| id.starts_with("i-sim-new-")));

    let lines = buffer.lines();
    assert_eq!(lines[0], "Instance count: 10");
    assert_eq!(lines[1], "Migrating 10 instances, max in flight: 2");
    assert_eq!(lines.last().map(String::as_str), Some("Finished."));
    assert_eq!(count_lines(&buffer, "Terminating "), 10);
    assert_eq!(count_lines(&buffer, "Error: "), 0);
}

#[tokio::test(start_paused = true)]
async fn replacement_notifications_are_deduplicated() {
    let fleet = SimFleet::new("web", 3, sim_config());
    let (orchestrator, buffer) = orchestrator(&fleet);

    orchestrator.migrate(&request("web", None, 0)).await.unwrap();

    let mut announced: Vec<String> = buffer
        .lines()
        .into_iter()
        .filter_map(|l| l.strip_prefix("New instance is in service: ").map(str::to_string))
        .collect();
    assert_eq!(announced.len(), 3);
    announced.sort();
    announced.dedup();
    assert_eq!(announced.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn cluster_members_are_drained_before_termination() {
    let fleet = SimFleet::new("web", 4, sim_config()).with_cluster("apps");
    let (orchestrator, buffer) = orchestrator(&fleet);

    let summary = orchestrator
        .migrate(&request("web", Some("apps"), 50))
        .await
        .unwrap();

    assert_eq!(summary.terminated, 4);
    assert_eq!(fleet.calls().request_drain, 4);
    assert!(fleet.peak_unavailable() <= 2);

    let lines = buffer.lines();
    let drain_at = lines
        .iter()
        .position(|l| l == "Draining i-sim-0000 in cluster apps")
        .unwrap();
    let terminate_at = lines.iter().position(|l| l == "Terminating i-sim-0000").unwrap();
    assert!(drain_at < terminate_at);
}

#[tokio::test(start_paused = true)]
async fn transient_drain_poll_errors_still_drain() {
    let fleet = SimFleet::new("web", 2, sim_config()).with_cluster("apps");
    fleet.fail_next_describe(2);
    let (orchestrator, buffer) = orchestrator(&fleet);

    let summary = orchestrator
        .migrate(&request("web", Some("apps"), 50))
        .await
        .unwrap();

    assert_eq!(summary.terminated, 2);
    assert_eq!(count_lines(&buffer, "Warning: failed to get cluster member state for i-sim-0000"), 2);
    assert_eq!(count_lines(&buffer, "timeout reached"), 0);
    // One drain per instance, nothing resubmitted.
    assert_eq!(fleet.calls().request_drain, 2);
}

#[tokio::test(start_paused = true)]
async fn termination_failures_are_resubmitted() {
    let fleet = SimFleet::new("web", 2, sim_config());
    fleet.fail_next_terminate(2);
    let (orchestrator, buffer) = orchestrator(&fleet);

    let summary = orchestrator.migrate(&request("web", None, 50)).await.unwrap();

    assert_eq!(summary.terminated, 2);
    assert_eq!(fleet.calls().terminate, 4);
    assert_eq!(count_lines(&buffer, "Error: failed to terminate i-sim-0000"), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_ticks_are_skipped() {
    let fleet = SimFleet::new("web", 2, sim_config());
    let (orchestrator, buffer) = orchestrator(&fleet);

    // Break the first three reconciliation ticks, after the initial listing.
    let injector = fleet.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        injector.fail_next_list(3);
    });

    let summary = orchestrator.migrate(&request("web", None, 50)).await.unwrap();
    assert_eq!(summary.terminated, 2);
    assert_eq!(count_lines(&buffer, "Error: failed to refresh group state"), 3);
}

#[tokio::test(start_paused = true)]
async fn stuck_drain_retries_until_stall() {
    let fleet = SimFleet::new("web", 2, sim_config()).with_cluster("apps");
    fleet.mark_stuck("i-sim-0000");
    let (orchestrator, buffer) = orchestrator(&fleet);

    let started = tokio::time::Instant::now();
    let err = orchestrator
        .migrate(&request("web", Some("apps"), 50))
        .await
        .unwrap_err();

    match err {
        MigrateError::Stalled { idle } => assert_eq!(idle, Duration::from_secs(900)),
        other => panic!("expected Stalled, got {other:?}"),
    }
    assert_eq!(started.elapsed(), Duration::from_secs(900));

    // Drain at 0s, retried at 310s and 620s; the third attempt is cut off.
    assert_eq!(fleet.calls().request_drain, 3);
    assert_eq!(fleet.calls().terminate, 0);
    assert_eq!(
        count_lines(&buffer, "timeout reached when trying to drain i-sim-0000 in cluster apps"),
        2
    );
    assert!(buffer.lines().last().unwrap().starts_with("Error: migration stalled"));
}

#[tokio::test(start_paused = true)]
async fn replacements_that_never_come_up_stall() {
    let config = SimulationConfig {
        launch_delay_secs: 24 * 3600,
        ..sim_config()
    };
    let fleet = SimFleet::new("web", 4, config);
    let (orchestrator, _) = orchestrator(&fleet);

    let err = orchestrator.migrate(&request("web", None, 50)).await.unwrap_err();
    assert!(matches!(err, MigrateError::Stalled { .. }));
    // Only the first admission window was used.
    assert_eq!(fleet.calls().terminate, 2);
}

#[tokio::test(start_paused = true)]
async fn summary_serializes() {
    let fleet = SimFleet::new("web", 2, sim_config());
    let (orchestrator, _) = orchestrator(&fleet);

    let summary = orchestrator.migrate(&request("web", None, 50)).await.unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["terminated"], 2);
    assert_eq!(json["max_in_flight"], 1);
}
