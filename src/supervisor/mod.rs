//! Worker supervision
//!
//! This module provides the guardian's supervision infrastructure:
//! - Process handle with tree-wide stop/kill and append-only output capture
//! - HTTP health probe with fail-open payload classification
//! - Failure counter with threshold and staleness rules
//! - Supervisor control loop that restarts the worker

pub mod core;
pub mod failure;
pub mod platform;
pub mod probe;
pub mod process;
pub mod types;

pub use self::core::Supervisor;
pub use failure::{FailureCounter, FailureWindow};
pub use platform::{NativeTree, ProcessTree};
pub use probe::{classify_payload, Evidence, HealthCheck, HealthStatus, HttpHealthProbe, ProbeResult};
pub use process::{
    CommandLauncher, LaunchSpec, OutputLog, ProcessHandle, StopOutcome, SupervisedWorker,
    WorkerLauncher,
};
pub use types::{RestartPolicy, RestartReason, SupervisorEvent, SupervisorState, SupervisorStats};
