use std::time::Duration;
use thiserror::Error;

/// Main error type for the guardian
#[derive(Error, Debug)]
pub enum GuardianError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Process lifecycle errors
    #[error("Failed to spawn worker `{command}`: {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Worker (pid {pid}) did not exit within {timeout:?} of a graceful stop")]
    StopTimeout { pid: u32, timeout: Duration },

    #[error("Failed to signal worker process tree (pid {pid}): {reason}")]
    Signal { pid: u32, reason: String },

    // Health probe errors
    #[error("Health endpoint unreachable: {0}")]
    ProbeUnreachable(String),

    #[error("Health endpoint returned HTTP {0}")]
    ProbeUnhealthy(u16),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for GuardianError
pub type Result<T> = std::result::Result<T, GuardianError>;

impl GuardianError {
    /// Errors that only affect the current worker generation.
    ///
    /// The supervisor recovers from these through its normal restart path;
    /// anything else is treated as an unexpected loop error and backed off.
    pub fn is_worker_scoped(&self) -> bool {
        matches!(
            self,
            GuardianError::SpawnFailed { .. }
                | GuardianError::StopTimeout { .. }
                | GuardianError::ProbeUnreachable(_)
                | GuardianError::ProbeUnhealthy(_)
        )
    }
}
