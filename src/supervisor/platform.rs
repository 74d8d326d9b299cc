//! Platform process-tree control
//!
//! The worker is usually a launcher script that forks the real program, so
//! termination always targets the whole tree rather than a single pid.

use async_trait::async_trait;
use std::io;
use tokio::process::Command;

/// Process-tree capability used by [`ProcessHandle`](super::ProcessHandle)
#[async_trait]
pub trait ProcessTree: Send + Sync {
    /// Build a command that runs `line` through the platform shell
    fn shell(&self, line: &str) -> Command;

    /// Arrange for the spawned child to lead its own tree
    fn prepare(&self, cmd: &mut Command);

    /// Ask the tree rooted at `pid` to exit
    async fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Forcefully terminate the tree rooted at `pid`
    async fn kill(&self, pid: u32) -> io::Result<()>;
}

#[cfg(unix)]
pub use posix::PosixTree as NativeTree;
#[cfg(windows)]
pub use win::WindowsTree as NativeTree;

/// Process-tree implementation for the build target
pub fn native() -> NativeTree {
    NativeTree::default()
}

#[cfg(unix)]
mod posix {
    use super::*;
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    /// Signals the worker's process group; the child is spawned as group leader
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PosixTree;

    fn signal_group(pid: u32, signal: Signal) -> io::Result<()> {
        match killpg(Pid::from_raw(pid as i32), signal) {
            // Group already gone
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    #[async_trait]
    impl ProcessTree for PosixTree {
        fn shell(&self, line: &str) -> Command {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(line);
            cmd
        }

        fn prepare(&self, cmd: &mut Command) {
            cmd.process_group(0);
        }

        async fn terminate(&self, pid: u32) -> io::Result<()> {
            signal_group(pid, Signal::SIGTERM)
        }

        async fn kill(&self, pid: u32) -> io::Result<()> {
            signal_group(pid, Signal::SIGKILL)
        }
    }
}

#[cfg(windows)]
mod win {
    use super::*;
    use tracing::debug;

    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    // taskkill exit code when no matching process exists
    const TASKKILL_NOT_FOUND: i32 = 128;

    /// Uses `taskkill /T` so children of a .bat launcher go down with it
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WindowsTree;

    async fn taskkill(pid: u32, force: bool) -> io::Result<()> {
        let pid = pid.to_string();
        let mut cmd = Command::new("taskkill");
        cmd.args(["/PID", pid.as_str(), "/T"]);
        if force {
            cmd.arg("/F");
        }

        let output = cmd.output().await?;
        match output.status.code() {
            Some(0) | Some(TASKKILL_NOT_FOUND) => Ok(()),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                debug!("taskkill for pid {} failed: {}", pid, stderr);
                Err(io::Error::new(io::ErrorKind::Other, stderr))
            }
        }
    }

    #[async_trait]
    impl ProcessTree for WindowsTree {
        fn shell(&self, line: &str) -> Command {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(line);
            cmd
        }

        fn prepare(&self, cmd: &mut Command) {
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        async fn terminate(&self, pid: u32) -> io::Result<()> {
            taskkill(pid, false).await
        }

        async fn kill(&self, pid: u32) -> io::Result<()> {
            taskkill(pid, true).await
        }
    }
}
