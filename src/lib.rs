pub mod cli;
pub mod config;
pub mod coordination;
pub mod error;
pub mod supervisor;

pub use config::GuardianConfig;
pub use coordination::{shutdown_channel, ShutdownHandle, ShutdownSignal, ShutdownToken};
pub use error::{GuardianError, Result};
pub use supervisor::{
    HealthStatus, HttpHealthProbe, LaunchSpec, OutputLog, ProcessHandle, RestartPolicy,
    RestartReason, Supervisor, SupervisorEvent, SupervisorState, SupervisorStats,
};
