//! Supervisor loop
//!
//! One background task runs the supervised command over and over:
//!
//! ```text
//! run_once → (drain output | log error) → back-off → run_once → ...
//! ```
//!
//! Every outcome (clean exit, failed exit, failed spawn) is followed by the
//! same fixed back-off. Runs never overlap: the next spawn happens only after
//! the previous child has exited, its output has been drained and the back-off
//! has elapsed.
//!
//! ## Stopping
//!
//! The loop watches a [`SupervisorState`] flag written by the signal
//! controller. `Stopping` is honoured before each run and during the back-off;
//! a child that is already running is left alone. In the daemon the process
//! normally exits before the loop notices.
//!
//! ## Components
//!
//! - [`CaptureRunner`]: runs one invocation and streams its stdout to a sink
//! - [`ProcessAdapter`]: trait for abstracting process creation
//! - [`Supervisor`]: the restart loop itself

use crate::Invocation;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub mod adapters;
pub mod capture;


pub use adapters::*;
pub use capture::*;

/// Fixed pause between the end of one run and the start of the next
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Desired lifecycle of the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Keep restarting the command
    Running,
    /// Do not start any further runs
    Stopping,
}

/// Create the lifecycle flag, initially [`SupervisorState::Running`]
pub fn lifecycle() -> (watch::Sender<SupervisorState>, watch::Receiver<SupervisorState>) {
    watch::channel(SupervisorState::Running)
}

/// Outcome counters of a finished supervisor loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Number of run attempts, including failed spawns
    pub runs: u64,
    /// Runs that exited with status 0
    pub clean_exits: u64,
    /// Runs that started but exited unsuccessfully
    pub run_failures: u64,
    /// Runs whose process could not be started
    pub spawn_failures: u64,
}

/// Configuration for spawning a supervisor
pub struct SupervisorConfig {
    /// Command to keep running
    pub invocation: Arc<Invocation>,
    /// Runner used for each attempt
    pub runner: CaptureRunner,
    /// Pause after every run
    pub backoff: Duration,
    /// Stop after this many runs (unbounded when `None`)
    pub max_runs: Option<u64>,
    /// Lifecycle flag written by the signal controller
    pub state_rx: watch::Receiver<SupervisorState>,
}

/// The restart loop
pub struct Supervisor {
    invocation: Arc<Invocation>,
    runner: CaptureRunner,
    backoff: Duration,
    max_runs: Option<u64>,
    state_rx: watch::Receiver<SupervisorState>,
}

impl Supervisor {
    /// Create a supervisor from its configuration
    pub fn new(config: SupervisorConfig) -> Self {
        let SupervisorConfig {
            invocation,
            runner,
            backoff,
            max_runs,
            state_rx,
        } = config;

        Self {
            invocation,
            runner,
            backoff,
            max_runs,
            state_rx,
        }
    }

    /// Run until the lifecycle flag reads `Stopping` or `max_runs` is reached
    pub async fn run(mut self) -> SupervisorReport {
        info!(
            "Supervising '{}' with a back-off of {:?}",
            self.invocation, self.backoff
        );
        let mut report = SupervisorReport::default();

        while !self.stop_requested() && !self.limit_reached(&report) {
            report.runs += 1;
            let attempt = report.runs;

            match self.runner.run_once(&self.invocation).await {
                Ok(completion) => {
                    let pid = completion.pid();
                    let stats = completion.wait().await;
                    report.clean_exits += 1;
                    info!(
                        "Process {} exited successfully (attempt {}, {} lines captured, {} dropped)",
                        pid, attempt, stats.lines_written, stats.lines_dropped
                    );
                }
                Err(e) if e.is_spawn() => {
                    report.spawn_failures += 1;
                    error!("Failed to start '{}' (attempt {}): {}", self.invocation, attempt, e);
                }
                Err(e) => {
                    report.run_failures += 1;
                    error!("'{}' failed (attempt {}): {}", self.invocation, attempt, e);
                }
            }

            if self.limit_reached(&report) {
                break;
            }

            info!("Restarting '{}' in {:?}", self.invocation, self.backoff);
            if !self.sleep_backoff().await {
                break;
            }
        }

        info!("Supervisor loop stopped after {} runs", report.runs);
        report
    }

    fn stop_requested(&self) -> bool {
        *self.state_rx.borrow() == SupervisorState::Stopping
    }

    fn limit_reached(&self, report: &SupervisorReport) -> bool {
        self.max_runs.is_some_and(|max| report.runs >= max)
    }

    /// Sleep for the back-off; returns false if a stop was requested meanwhile
    async fn sleep_backoff(&mut self) -> bool {
        let backoff = self.backoff;
        tokio::select! {
            _ = tokio::time::sleep(backoff) => true,
            _ = wait_for_stop(&mut self.state_rx) => false,
        }
    }
}

async fn wait_for_stop(state_rx: &mut watch::Receiver<SupervisorState>) {
    let closed = state_rx
        .wait_for(|state| *state == SupervisorState::Stopping)
        .await
        .is_err();
    if closed {
        // Controller gone: nobody can ask us to stop any more.
        std::future::pending::<()>().await;
    }
}

/// Spawn the supervisor loop as a background task
///
/// The daemon never joins the returned handle; it is there for tests and
/// embedders that bound the loop with `max_runs` or the lifecycle flag.
pub fn spawn_supervisor(config: SupervisorConfig) -> JoinHandle<SupervisorReport> {
    info!("Spawning supervisor for '{}'", config.invocation);
    tokio::spawn(Supervisor::new(config).run())
}
