use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::supervisor::{LaunchSpec, RestartPolicy};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardianConfig {
    pub worker: WorkerConfig,
    pub health: HealthConfig,
    pub policy: PolicyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Program (or shell command line when `shell` is set) to launch
    pub command: String,
    /// Extra arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the worker
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Additional environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Run the command through the platform shell (sh -c / cmd /C)
    #[serde(default)]
    pub shell: bool,
    /// Append-only file receiving the worker's stdout and stderr
    #[serde(default = "default_output_log")]
    pub output_log: PathBuf,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_log() -> PathBuf {
    PathBuf::from("worker_output.log")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    /// Health endpoint exposed by the worker
    #[serde(default = "default_health_url")]
    pub url: String,
    /// Hard timeout for a single probe in seconds
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
    /// Boolean field in the JSON payload that reports whether the worker is active
    #[serde(default = "default_liveness_field")]
    pub liveness_field: String,
}

fn default_health_url() -> String {
    "http://127.0.0.1:8002/api/status".to_string()
}

fn default_health_timeout() -> u64 {
    10
}

fn default_liveness_field() -> String {
    "is_running".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            url: default_health_url(),
            timeout_secs: default_health_timeout(),
            liveness_field: default_liveness_field(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Interval between supervision ticks in seconds
    pub check_interval_secs: u64,
    /// Consecutive probe failures before a restart
    pub failure_threshold: u32,
    /// Wait after every (re)start before the first probe
    pub startup_grace_secs: u64,
    /// Restart if no reported success was seen for this long (disabled when unset)
    #[serde(default)]
    pub stale_data_threshold_secs: Option<u64>,
    /// Graceful stop budget before escalating to a forced kill
    pub stop_timeout_secs: u64,
    /// Sleep after an unexpected error inside one supervision tick
    pub error_backoff_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            failure_threshold: 3,
            startup_grace_secs: 30,
            stale_data_threshold_secs: None,
            stop_timeout_secs: 10,
            error_backoff_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Optional guardian log file, written in addition to stdout
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

impl GuardianConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("worker.working_dir", ".")?
            .set_default("worker.shell", false)?
            .set_default("worker.output_log", "worker_output.log")?
            .set_default("health.url", default_health_url())?
            .set_default("health.timeout_secs", 10)?
            .set_default("health.liveness_field", default_liveness_field())?
            .set_default("policy.check_interval_secs", 60)?
            .set_default("policy.failure_threshold", 3)?
            .set_default("policy.startup_grace_secs", 30)?
            .set_default("policy.stop_timeout_secs", 10)?
            .set_default("policy.error_backoff_secs", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("GUARDIAN_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (GUARDIAN_WORKER__COMMAND, etc.)
            .add_source(
                Environment::with_prefix("GUARDIAN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Restart policy derived from the `[policy]` and `[health]` sections
    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            check_interval: Duration::from_secs(self.policy.check_interval_secs),
            failure_threshold: self.policy.failure_threshold,
            post_restart_grace_period: Duration::from_secs(self.policy.startup_grace_secs),
            stale_data_threshold: self
                .policy
                .stale_data_threshold_secs
                .map(Duration::from_secs),
            probe_timeout: Duration::from_secs(self.health.timeout_secs),
            stop_timeout: Duration::from_secs(self.policy.stop_timeout_secs),
            error_backoff: Duration::from_secs(self.policy.error_backoff_secs),
        }
    }

    /// Launch specification for the supervised worker
    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            program: self.worker.command.clone(),
            args: self.worker.args.clone(),
            working_dir: self.worker.working_dir.clone(),
            env: self.worker.env.clone(),
            shell: self.worker.shell,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.worker.command.trim().is_empty() {
            errors.push("worker.command must not be empty".to_string());
        }

        match url::Url::parse(&self.health.url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => errors.push(format!(
                "health.url must use http or https, got scheme '{}'",
                parsed.scheme()
            )),
            Err(e) => errors.push(format!("health.url is not a valid URL: {e}")),
        }

        if self.health.timeout_secs == 0 {
            errors.push("health.timeout_secs must be positive".to_string());
        }

        if self.health.liveness_field.trim().is_empty() {
            errors.push("health.liveness_field must not be empty".to_string());
        }

        if self.policy.check_interval_secs == 0 {
            errors.push("policy.check_interval_secs must be positive".to_string());
        }

        if self.policy.failure_threshold == 0 {
            errors.push("policy.failure_threshold must be at least 1".to_string());
        }

        if self.policy.stale_data_threshold_secs == Some(0) {
            errors.push(
                "policy.stale_data_threshold_secs must be positive (omit it to disable)"
                    .to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
