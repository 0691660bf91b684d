//! Signal controller: maps termination signals to an exit decision
//!
//! ```text
//! WAITING --SIGINT/SIGTERM/SIGQUIT--> TERMINATING (exit 0)
//! WAITING --SIGHUP------------------> WAITING     (ignored)
//! WAITING --anything else-----------> TERMINATING (exit 1)
//! ```
//!
//! On entering `TERMINATING` the controller flips the lifecycle flag to
//! [`SupervisorState::Stopping`], waits a short grace period so pending log
//! writes can land, and hands the exit code back to the caller.
//!
//! ## Signals
//! **Unix platforms:** `SIGHUP`, `SIGINT`, `SIGTERM`, `SIGQUIT`
//!
//! **Windows platforms:** `Ctrl-C` via [`tokio::signal::ctrl_c`], treated as an interrupt

use crate::supervisor::SupervisorState;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Exit code for an orderly shutdown
pub const EXIT_GRACEFUL: i32 = 0;

/// Exit code for an unexpected stop
pub const EXIT_FORCED: i32 = 1;

/// Pause between deciding to exit and returning the exit code
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// A signal delivered to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Hangup,
    Interrupt,
    Terminate,
    Quit,
    /// Any other signal, by number
    Other(i32),
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Hangup => f.write_str("SIGHUP"),
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
            ShutdownSignal::Quit => f.write_str("SIGQUIT"),
            ShutdownSignal::Other(n) => write!(f, "signal {n}"),
        }
    }
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Listening for signals
    Waiting,
    /// Shutting down with the given exit code
    Terminating { exit_code: i32 },
}

/// Something that yields signals
///
/// `None` means the source is exhausted and no further signal will arrive.
#[async_trait]
pub trait SignalSource: Send {
    /// Wait for the next signal
    async fn recv(&mut self) -> Option<ShutdownSignal>;
}

#[async_trait]
impl SignalSource for mpsc::Receiver<ShutdownSignal> {
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        mpsc::Receiver::recv(self).await
    }
}

/// Operating system signals
///
/// Listeners are registered on construction, so signals that arrive before
/// the first `recv` are not lost. Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct OsSignals {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    quit: tokio::signal::unix::Signal,
}

impl OsSignals {
    /// Register listeners for the handled signals
    #[cfg(unix)]
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    /// Register listeners for the handled signals
    #[cfg(not(unix))]
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {})
    }
}

#[async_trait]
impl SignalSource for OsSignals {
    #[cfg(unix)]
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::select! {
            s = self.hangup.recv() => s.map(|_| ShutdownSignal::Hangup),
            s = self.interrupt.recv() => s.map(|_| ShutdownSignal::Interrupt),
            s = self.terminate.recv() => s.map(|_| ShutdownSignal::Terminate),
            s = self.quit.recv() => s.map(|_| ShutdownSignal::Quit),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::signal::ctrl_c()
            .await
            .ok()
            .map(|_| ShutdownSignal::Interrupt)
    }
}

/// Foreground state machine owning the supervisor's exit
#[derive(Debug)]
pub struct SignalController {
    state: ControllerState,
    state_tx: watch::Sender<SupervisorState>,
    grace: Duration,
}

impl SignalController {
    /// Create a controller that publishes to `state_tx`
    pub fn new(state_tx: watch::Sender<SupervisorState>, grace: Duration) -> Self {
        Self {
            state: ControllerState::Waiting,
            state_tx,
            grace,
        }
    }

    /// Current state
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Apply one signal and return the resulting state
    ///
    /// `Terminating` is final; further signals do not change it.
    pub fn on_signal(&mut self, signal: ShutdownSignal) -> ControllerState {
        if let ControllerState::Terminating { .. } = self.state {
            return self.state;
        }

        match signal {
            ShutdownSignal::Hangup => {
                info!("Received {}, ignoring", signal);
            }
            ShutdownSignal::Interrupt | ShutdownSignal::Terminate | ShutdownSignal::Quit => {
                info!("Received {}, shutting down", signal);
                self.state = ControllerState::Terminating {
                    exit_code: EXIT_GRACEFUL,
                };
            }
            ShutdownSignal::Other(_) => {
                warn!("Received unexpected {}, forcing shutdown", signal);
                self.state = ControllerState::Terminating {
                    exit_code: EXIT_FORCED,
                };
            }
        }
        self.state
    }

    /// Wait for signals until shutdown is decided, then return the exit code
    ///
    /// Before returning, the lifecycle flag is set to `Stopping` and the grace
    /// period is slept.
    pub async fn run<S: SignalSource + ?Sized>(mut self, source: &mut S) -> i32 {
        let exit_code = loop {
            match source.recv().await {
                Some(signal) => {
                    if let ControllerState::Terminating { exit_code } = self.on_signal(signal) {
                        break exit_code;
                    }
                }
                None => {
                    warn!("Signal source closed, forcing shutdown");
                    self.state = ControllerState::Terminating {
                        exit_code: EXIT_FORCED,
                    };
                    break EXIT_FORCED;
                }
            }
        };

        self.state_tx.send_replace(SupervisorState::Stopping);
        info!("Supervisor exiting with code {}", exit_code);
        tokio::time::sleep(self.grace).await;
        exit_code
    }
}
