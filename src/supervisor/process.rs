//! Worker process handle
//!
//! Spawns the worker with stdout/stderr appended to an output log, polls it
//! without blocking, and tears its whole process tree down on stop/kill.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::platform::{self, NativeTree, ProcessTree};
use crate::error::{GuardianError, Result};

/// How long to wait for the OS to reap a force-killed tree
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// What to launch and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    /// Pass `program` and `args` verbatim to the platform shell
    pub shell: bool,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            env: BTreeMap::new(),
            shell: false,
        }
    }

    pub fn shell(line: impl Into<String>) -> Self {
        Self {
            shell: true,
            ..Self::new(line)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Command line as shown in logs (and as handed to the shell)
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn spawn_failed(&self, reason: impl Into<String>) -> GuardianError {
        GuardianError::SpawnFailed {
            command: self.command_line(),
            reason: reason.into(),
        }
    }
}

/// Append-only destination for worker output.
///
/// Never truncated, so history survives restarts; lifecycle markers make the
/// file self-delimiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLog {
    path: PathBuf,
}

impl OutputLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }

    /// Append a timestamped marker line
    pub fn mark(&self, event: &str) -> io::Result<()> {
        let mut file = self.open()?;
        writeln!(file, "\n--- {}: {} ---", event, Utc::now().to_rfc3339())?;
        file.flush()
    }

    /// Best-effort [`mark`](Self::mark); an unwritable log never blocks process control
    fn note(&self, event: &str) {
        if let Err(e) = self.mark(event) {
            warn!("Could not write '{}' marker to {}: {}", event, self.path.display(), e);
        }
    }
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Worker had already exited
    AlreadyExited,
    /// Worker exited within the graceful timeout
    Graceful,
    /// Graceful stop timed out and the tree was force-killed
    Killed,
}

/// One live worker generation, exclusively owned
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    /// Tree root (the process-group id on unix); kept after the leader is reaped
    pid: Option<u32>,
    sink: OutputLog,
    tree: NativeTree,
    exit_status: Option<ExitStatus>,
}

impl ProcessHandle {
    /// Spawn the worker without waiting on it
    pub fn start(spec: &LaunchSpec, sink: &OutputLog) -> Result<Self> {
        let tree = platform::native();

        if !spec.working_dir.is_dir() {
            return Err(spec.spawn_failed(format!(
                "working directory {} does not exist",
                spec.working_dir.display()
            )));
        }

        let stdout = sink.open().map_err(|e| {
            spec.spawn_failed(format!("cannot open output log {}: {}", sink.path().display(), e))
        })?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| spec.spawn_failed(format!("cannot share output log handle: {}", e)))?;

        let mut cmd = if spec.shell {
            tree.shell(&spec.command_line())
        } else {
            let mut cmd = Command::new(&spec.program);
            cmd.args(&spec.args);
            cmd
        };
        cmd.current_dir(&spec.working_dir)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        tree.prepare(&mut cmd);

        let command = spec.command_line();
        sink.note(&format!("START {}", command));

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                sink.note(&format!("SPAWN FAILED {}: {}", command, e));
                return Err(spec.spawn_failed(e.to_string()));
            }
        };
        let pid = child.id();

        info!(
            "Worker started (pid {}), output appended to {}",
            pid.map(|p| p.to_string()).unwrap_or_else(|| "?".into()),
            sink.path().display()
        );

        Ok(Self {
            child,
            pid,
            sink: sink.clone(),
            tree,
            exit_status: None,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status, once the exit has been observed
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Non-blocking poll of the OS process state
    pub fn is_alive(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }

        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.record_exit(status);
                false
            }
            Err(e) => {
                warn!("Could not poll worker (pid {:?}): {}", self.pid, e);
                false
            }
        }
    }

    fn record_exit(&mut self, status: ExitStatus) {
        self.exit_status = Some(status);
        debug!("Worker (pid {:?}) exited: {}", self.pid, status);
        self.sink.note(&format!("EXIT {}", status));
    }

    /// Kill whatever is left of the tree once its root has exited.
    ///
    /// Descendants that ignored the graceful request, or that outlived a
    /// launcher script which died on its own, are still in the group.
    async fn sweep(&self) -> Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        self.tree.kill(pid).await.map_err(|e| GuardianError::Signal {
            pid,
            reason: format!("cleaning up leftover descendants: {}", e),
        })
    }

    fn live_pid(&self) -> Result<u32> {
        self.pid
            .ok_or_else(|| GuardianError::Internal("live worker without a pid".to_string()))
    }

    /// Graceful termination, escalating to [`kill`](Self::kill) after `timeout`
    pub async fn stop(&mut self, timeout: Duration) -> Result<StopOutcome> {
        if !self.is_alive() {
            self.sweep().await?;
            return Ok(StopOutcome::AlreadyExited);
        }

        let pid = self.live_pid()?;
        self.sink.note(&format!("STOP pid {}", pid));
        info!("Stopping worker (pid {}), waiting up to {:?}", pid, timeout);

        if let Err(e) = self.tree.terminate(pid).await {
            warn!("Graceful stop request for pid {} failed: {}", pid, e);
        }

        let waited = tokio::time::timeout(timeout, self.child.wait()).await;
        match waited {
            Ok(Ok(status)) => {
                self.record_exit(status);
                self.sweep().await?;
                Ok(StopOutcome::Graceful)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                let err = GuardianError::StopTimeout { pid, timeout };
                warn!("{}, escalating to kill", err);
                self.kill().await?;
                Ok(StopOutcome::Killed)
            }
        }
    }

    /// Unconditional termination of the worker and every descendant
    pub async fn kill(&mut self) -> Result<()> {
        if !self.is_alive() {
            return self.sweep().await;
        }

        let pid = self.live_pid()?;
        self.sink.note(&format!("KILL pid {}", pid));
        warn!("Force-killing worker process tree (pid {})", pid);

        if let Err(e) = self.tree.kill(pid).await {
            warn!("Tree kill for pid {} failed ({}), killing the direct child", pid, e);
            self.child.start_kill()?;
        }

        let reaped = tokio::time::timeout(KILL_REAP_TIMEOUT, self.child.wait()).await;
        match reaped {
            Ok(Ok(status)) => {
                self.record_exit(status);
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(GuardianError::Signal {
                pid,
                reason: format!("still running {:?} after kill", KILL_REAP_TIMEOUT),
            }),
        }
    }
}

/// Worker abstraction the supervisor drives
#[async_trait]
pub trait SupervisedWorker: Send {
    fn pid(&self) -> Option<u32>;

    fn is_alive(&mut self) -> bool;

    async fn stop(&mut self, timeout: Duration) -> Result<StopOutcome>;

    async fn kill(&mut self) -> Result<()>;
}

#[async_trait]
impl SupervisedWorker for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        ProcessHandle::pid(self)
    }

    fn is_alive(&mut self) -> bool {
        ProcessHandle::is_alive(self)
    }

    async fn stop(&mut self, timeout: Duration) -> Result<StopOutcome> {
        ProcessHandle::stop(self, timeout).await
    }

    async fn kill(&mut self) -> Result<()> {
        ProcessHandle::kill(self).await
    }
}

/// Factory for new worker generations
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn SupervisedWorker>>;
}

/// Launches the configured command as an OS process
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    spec: LaunchSpec,
    sink: OutputLog,
}

impl CommandLauncher {
    pub fn new(spec: LaunchSpec, sink: OutputLog) -> Self {
        Self { spec, sink }
    }
}

impl WorkerLauncher for CommandLauncher {
    fn launch(&self) -> Result<Box<dyn SupervisedWorker>> {
        let handle = ProcessHandle::start(&self.spec, &self.sink)?;
        Ok(Box::new(handle))
    }
}
