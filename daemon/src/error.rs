//! Daemon error types

use thiserror::Error;

/// Errors that stop the daemon before supervision begins
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Startup failed: {0}")]
    Startup(#[from] tether_core::CoreError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DaemonError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            DaemonError::InvalidArguments(_) => "DAEMON001",
            DaemonError::Startup(_) => "DAEMON002",
            DaemonError::IoError(_) => "DAEMON003",
        }
    }
}

/// Daemon-specific result type
pub type Result<T> = std::result::Result<T, DaemonError>;
