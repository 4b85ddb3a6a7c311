use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "rotor",
    about = "Rotor — rolling replacement of every instance in a scaling group",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Region to use, overrides the shared credential files
    #[arg(short, long, env = "AWS_REGION", global = true)]
    region: Option<String>,
    /// Path to a rotor.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Diagnostic log format on stderr
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate every instance of a simulated scaling group.
    ///
    /// The group and optional cluster live in memory; terminated instances
    /// are replaced after the configured launch delay.
    Simulate(commands::simulate::SimulateArgs),
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = commands::simulate::load_config(cli.config.as_deref(), cli.region)?;

    match cli.command {
        Commands::Simulate(args) => commands::simulate::simulate(args, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_simulate_flags() {
        let cli = Cli::try_parse_from([
            "rotor",
            "simulate",
            "web",
            "--instances",
            "10",
            "--min-healthy-percent",
            "80",
            "--cluster",
            "apps",
            "--region",
            "eu-west-1",
        ])
        .unwrap();

        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
        let Commands::Simulate(args) = cli.command;
        assert_eq!(args.group, "web");
        assert_eq!(args.instances, 10);
        assert_eq!(args.min_healthy_percent, 80);
        assert_eq!(args.cluster.as_deref(), Some("apps"));
    }

    #[test]
    fn group_name_is_required() {
        assert!(Cli::try_parse_from(["rotor", "simulate"]).is_err());
    }
}
