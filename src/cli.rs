use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::error::{GuardianError, Result};
use crate::supervisor::{HealthCheck, HealthStatus, HttpHealthProbe, ProbeResult};

#[derive(Parser, Debug)]
#[command(name = "guardian")]
#[command(version = "0.1.0")]
#[command(about = "Keeps a long-running worker alive via HTTP health probes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory (default.toml plus the GUARDIAN_ENV overlay)
    #[arg(short, long, default_value = "config", env = "GUARDIAN_CONFIG_DIR")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Launch the worker and supervise it until interrupted (default)
    Run,
    /// Probe the configured health endpoint once and report the result
    Check,
    /// Print the effective configuration
    Config,
}

/// One-shot health check used by `guardian check`.
///
/// Alive results are returned as-is; failures become probe errors so the
/// process exit code reflects them.
pub async fn check_once(probe: &HttpHealthProbe) -> Result<ProbeResult> {
    let result = probe.check().await;
    match result.status {
        HealthStatus::Healthy | HealthStatus::Idle => Ok(result),
        HealthStatus::Unreachable => Err(GuardianError::ProbeUnreachable(probe.url().to_string())),
        HealthStatus::Unhealthy(code) => Err(GuardianError::ProbeUnhealthy(code)),
    }
}
