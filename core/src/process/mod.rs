//! Child process spawning for the capture runner
//!
//! The child gets a piped stdout that is wired up before `spawn()` returns, so
//! nothing the process writes early can be lost. stdin and stderr are
//! connected to the null device.
//!
//! No process group is created: a terminal or service manager that signals
//! the supervisor's group also reaches the child.

use crate::{CoreError, Invocation, ProcessExit, Result};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, error};

/// A spawned child process with its stdout still attached
#[derive(Debug)]
pub struct ChildProcess {
    /// The process ID of the spawned process
    pid: u32,
    /// The underlying Child handle for waiting and status checking
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Take the stdout handle for async reading, if available
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ProcessExit> {
        let status = self.child.wait().await.map_err(|e| {
            CoreError::ProcessWait(format!("Failed to wait for process {}: {}", self.pid, e))
        })?;
        Ok(exit_from_status(self.pid, status))
    }
}

/// Spawn `invocation` with stdout piped
///
/// Fails with [`CoreError::ProcessSpawn`] when the executable cannot be found
/// or started.
pub fn spawn(invocation: &Invocation) -> Result<ChildProcess> {
    debug!("Spawning process: {} {:?}", invocation.program, invocation.args);

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", invocation.program, e);
        CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", invocation.program, e))
    })?;

    let pid = child
        .id()
        .ok_or_else(|| CoreError::ProcessSpawn("Spawned child did not have a PID".to_string()))?;
    debug!("Spawned process {} for '{}'", pid, invocation.program);

    Ok(ChildProcess { pid, child })
}

fn exit_from_status(pid: u32, status: ExitStatus) -> ProcessExit {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    ProcessExit {
        pid,
        exit_code: status.code(),
        signal,
    }
}
