use std::time::Duration;

use super::probe::{HealthStatus, ProbeResult};

/// Restart policy for the supervised worker
///
/// Immutable for the lifetime of a [`Supervisor`](super::Supervisor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Interval between supervision ticks (default: 60s)
    pub check_interval: Duration,
    /// Consecutive probe failures that trigger a restart (default: 3)
    pub failure_threshold: u32,
    /// Wait after every (re)start before the first probe (default: 30s)
    pub post_restart_grace_period: Duration,
    /// Restart when no reported success was seen for this long (default: disabled)
    pub stale_data_threshold: Option<Duration>,
    /// Hard timeout for one health probe (default: 10s)
    pub probe_timeout: Duration,
    /// Graceful stop budget before a forced kill (default: 10s)
    pub stop_timeout: Duration,
    /// Backoff after an unexpected error inside one tick (default: 10s)
    pub error_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            failure_threshold: 3,
            post_restart_grace_period: Duration::from_secs(30),
            stale_data_threshold: None,
            probe_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(10),
            error_backoff: Duration::from_secs(10),
        }
    }
}

/// Supervisor control-loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Launching the first worker and waiting out the grace period
    Starting,
    /// Worker is alive and its last probe succeeded
    Running,
    /// Worker is alive but has outstanding probe failures
    Degraded,
    /// Replacing the worker
    Restarting,
    /// Stopping the worker for good
    ShuttingDown,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorState::Starting => write!(f, "starting"),
            SupervisorState::Running => write!(f, "running"),
            SupervisorState::Degraded => write!(f, "degraded"),
            SupervisorState::Restarting => write!(f, "restarting"),
            SupervisorState::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

/// Why a restart was issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartReason {
    /// The OS reported the worker as exited
    ProcessExited,
    /// Too many consecutive probe failures
    FailureThreshold { failures: u32 },
    /// No reported success within the staleness window
    StaleData { since_success: Duration },
}

impl std::fmt::Display for RestartReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartReason::ProcessExited => write!(f, "process died unexpectedly"),
            RestartReason::FailureThreshold { failures } => {
                write!(f, "{} consecutive health check failures", failures)
            }
            RestartReason::StaleData { since_success } => write!(
                f,
                "no genuine success signal for {}s",
                since_success.as_secs()
            ),
        }
    }
}

/// Event emitted by the supervisor
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// A new worker generation was launched
    Started { generation: u64, pid: Option<u32> },
    /// Launching the worker failed
    SpawnFailed { error: String },
    /// One health probe completed
    Probed {
        result: ProbeResult,
        consecutive_failures: u32,
    },
    /// The worker exited without being asked to
    ProcessExited { generation: u64 },
    /// A restart is about to happen
    RestartIssued { reason: RestartReason },
    /// Graceful stop timed out and the worker was force-killed
    StopEscalated { pid: Option<u32> },
    /// Loop terminated after stopping the worker
    ShutdownCompleted,
}

impl SupervisorEvent {
    /// Probe status carried by the event, if any
    pub fn probe_status(&self) -> Option<HealthStatus> {
        match self {
            SupervisorEvent::Probed { result, .. } => Some(result.status),
            _ => None,
        }
    }
}

/// Counters accumulated over one supervisor run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    pub launches: u64,
    pub restarts: u64,
    pub spawn_failures: u64,
    pub probes: u64,
    pub probe_failures: u64,
    pub unexpected_errors: u64,
}
