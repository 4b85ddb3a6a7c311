use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use tracing::info;

use rotor_core::{Progress, RotorConfig, SimulationConfig};
use rotor_migrate::{MigrationRequest, Orchestrator};
use rotor_sim::SimFleet;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Scaling group name
    pub group: String,
    /// Instances in the group at the start
    #[arg(long, default_value = "4")]
    pub instances: u32,
    /// Share of the group (0-100) that must stay healthy
    #[arg(long, default_value = "80")]
    pub min_healthy_percent: u32,
    /// Container cluster to drain members from
    #[arg(long)]
    pub cluster: Option<String>,
    /// Seconds before a replacement comes into service
    #[arg(long)]
    pub launch_delay_secs: Option<u64>,
    /// Seconds a draining member keeps running tasks
    #[arg(long)]
    pub drain_delay_secs: Option<u64>,
    /// Run on a virtual clock so the migration completes immediately
    #[arg(long)]
    pub instant: bool,
    /// Print the final summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Load the config file, if any, and apply the global overrides.
pub fn load_config(path: Option<&Path>, region: Option<String>) -> anyhow::Result<RotorConfig> {
    let mut config = match path {
        Some(p) => RotorConfig::from_file(p)?,
        None => RotorConfig::default(),
    };
    if region.is_some() {
        config.cloud.region = region;
    }
    Ok(config)
}

fn simulation_config(args: &SimulateArgs, base: &SimulationConfig) -> SimulationConfig {
    SimulationConfig {
        launch_delay_secs: args.launch_delay_secs.unwrap_or(base.launch_delay_secs),
        drain_delay_secs: args.drain_delay_secs.unwrap_or(base.drain_delay_secs),
        ..base.clone()
    }
}

pub fn simulate(args: SimulateArgs, config: RotorConfig) -> anyhow::Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(args.instant)
        .build()?;
    runtime.block_on(run(args, config))
}

async fn run(args: SimulateArgs, config: RotorConfig) -> anyhow::Result<ExitCode> {
    if let Some(region) = &config.cloud.region {
        info!(%region, "region override set");
    }

    let fleet = SimFleet::new(&args.group, args.instances, simulation_config(&args, &config.simulation));
    let fleet = match &args.cluster {
        Some(cluster) => fleet.with_cluster(cluster),
        None => fleet,
    };
    let fleet = Arc::new(fleet);

    let orchestrator = Orchestrator::new(
        fleet.clone(),
        fleet.clone(),
        fleet,
        config.migration,
        Progress::stdout(),
    );
    let request = MigrationRequest {
        group: args.group,
        cluster: args.cluster,
        min_healthy_percent: args.min_healthy_percent,
    };

    // The orchestrator has already written any fatal error as the last line.
    match orchestrator.migrate(&request).await {
        Ok(summary) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(_) => Ok(ExitCode::FAILURE),
    }
}
