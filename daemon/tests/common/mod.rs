//! Test utilities for integration tests in the daemon crate.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// A running `tether` binary that is killed if the test bails out early
pub struct TetherProcess {
    child: Child,
    pub log_dir: PathBuf,
}

impl TetherProcess {
    /// Start the binary with a private log directory and a 1s back-off
    pub fn start(log_dir: &Path, command: &[&str]) -> Self {
        Self::start_with_options(log_dir, &[], command)
    }

    /// Like [`TetherProcess::start`] with extra options before the command
    pub fn start_with_options(log_dir: &Path, options: &[&str], command: &[&str]) -> Self {
        let child = Command::new(env!("CARGO_BIN_EXE_tether"))
            .arg("--log-dir")
            .arg(log_dir)
            .arg("--backoff-secs")
            .arg("1")
            .args(options)
            .args(command)
            .env_remove("RUST_LOG")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn tether binary");
        Self {
            child,
            log_dir: log_dir.to_path_buf(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Contents of the current log file (through the `log` alias)
    pub fn log(&self) -> String {
        std::fs::read_to_string(self.log_dir.join("log")).unwrap_or_default()
    }

    /// Poll the log until `needle` appears `count` times
    pub fn wait_for_log(&self, needle: &str, count: usize, timeout: Duration) -> bool {
        poll(timeout, || self.log().matches(needle).count() >= count)
    }

    /// Poll for process exit
    pub fn wait_for_exit(&mut self, timeout: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(status) = self.child.try_wait().expect("try_wait") {
                return Some(status);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        None
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    #[cfg(unix)]
    pub fn signal(&self, signal: nix::sys::signal::Signal) {
        let pid = nix::unistd::Pid::from_raw(self.pid() as i32);
        nix::sys::signal::kill(pid, signal).expect("send signal");
    }
}

impl Drop for TetherProcess {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Poll `check` every 20ms until it holds or `timeout` elapses
pub fn poll(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    check()
}
