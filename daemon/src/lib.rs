//! Daemon library for tether
//!
//! Wires the core pieces together: the supervisor loop runs in the
//! background while the signal controller holds the foreground and decides
//! the exit code.

#![allow(unused_crate_dependencies)]

pub mod bootstrap;
pub mod cli;
pub mod error;


pub use bootstrap::RuntimeConfig;
pub use error::{DaemonError, Result};

use std::sync::Arc;
use tether_core::signals::SignalSource;
use tether_core::{
    filter_for, lifecycle, spawn_supervisor, CaptureRunner, OsSignals, SignalController,
    SupervisorConfig, SystemProcessAdapter, TracingSink,
};
use tracing::info;

/// The supervisor process
#[derive(Debug)]
pub struct Daemon {
    config: RuntimeConfig,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Supervise the configured command until an OS signal asks us to stop
    ///
    /// # Errors
    /// Returns an error if the signal handlers cannot be installed.
    pub async fn run(self) -> Result<i32> {
        let mut signals = OsSignals::new()?;
        Ok(self.run_with_signals(&mut signals).await)
    }

    /// Like [`Daemon::run`] with an explicit signal source
    ///
    /// Returns the exit code chosen by the signal controller. The supervisor
    /// loop is left running in the background; the caller is expected to
    /// exit the process.
    pub async fn run_with_signals<S: SignalSource + ?Sized>(self, signals: &mut S) -> i32 {
        let RuntimeConfig {
            invocation,
            backoff,
            grace,
            encoding,
            ..
        } = self.config;

        let filter = filter_for(encoding);
        info!("Decoding output as {}", filter.name());

        let runner = CaptureRunner::new(
            Arc::new(SystemProcessAdapter::new()),
            filter,
            Arc::new(TracingSink),
        );

        let (state_tx, state_rx) = lifecycle();
        let _supervisor = spawn_supervisor(SupervisorConfig {
            invocation,
            runner,
            backoff,
            max_runs: None,
            state_rx,
        });

        SignalController::new(state_tx, grace).run(signals).await
    }
}
