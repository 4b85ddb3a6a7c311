//! rotor.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RotorConfig {
    pub cloud: CloudConfig,
    pub migration: MigrationConfig,
    pub simulation: SimulationConfig,
}

/// Cloud client settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CloudConfig {
    /// Region override. Unset means the shared credential files decide.
    pub region: Option<String>,
}

/// Timers driving a migration session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MigrationConfig {
    /// Seconds between reconciliation ticks.
    pub tick_interval_secs: u64,
    /// Seconds between drain status polls.
    pub drain_poll_interval_secs: u64,
    /// Seconds before a drain gives up.
    pub drain_timeout_secs: u64,
    /// Seconds to wait before resubmitting a failed stage.
    pub retry_delay_secs: u64,
    /// Seconds without forward progress before the session fails.
    pub stall_timeout_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 10,
            drain_poll_interval_secs: 10,
            drain_timeout_secs: 300,
            retry_delay_secs: 10,
            stall_timeout_secs: 900,
        }
    }
}

impl MigrationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_secs(self.drain_poll_interval_secs.max(1))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

/// Behavior of the simulated fleet used by `rotor simulate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seconds a terminated instance stays in `Terminating`.
    pub terminate_delay_secs: u64,
    /// Seconds a replacement stays `Pending` before coming into service.
    pub launch_delay_secs: u64,
    /// Seconds after coming into service before a replacement registers in the cluster.
    pub register_delay_secs: u64,
    /// Seconds a draining member keeps running tasks.
    pub drain_delay_secs: u64,
    /// Tasks running on every cluster member.
    pub tasks_per_instance: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            terminate_delay_secs: 15,
            launch_delay_secs: 45,
            register_delay_secs: 10,
            drain_delay_secs: 30,
            tasks_per_instance: 2,
        }
    }
}

impl RotorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RotorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
