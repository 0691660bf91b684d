//! Core error types and utilities

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// The target executable could not be started
    #[error("Failed to spawn process: {0}")]
    ProcessSpawn(String),

    /// The target executable ran but did not exit cleanly
    #[error("Process {}", describe_exit(.exit_code, .signal))]
    ProcessExit {
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
        /// Terminating signal number (Unix only)
        signal: Option<i32>,
    },

    #[error("Failed to wait for process: {0}")]
    ProcessWait(String),

    /// A captured line could not be decoded with the configured encoding
    #[error("Failed to decode {len} byte line as {encoding}")]
    Decode {
        /// Name of the encoding that rejected the input
        encoding: &'static str,
        /// Length of the rejected line in bytes
        len: usize,
    },

    #[error("Log sink error: {0}")]
    Sink(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "CORE001",
            CoreError::InitializationError(_) => "CORE003",
            CoreError::IoError(_) => "CORE005",
            CoreError::ProcessSpawn(_) => "CORE010",
            CoreError::ProcessExit { .. } => "CORE011",
            CoreError::ProcessWait(_) => "CORE012",
            CoreError::Decode { .. } => "CORE020",
            CoreError::Sink(_) => "CORE021",
        }
    }

    /// Whether this error means the child never started
    pub fn is_spawn(&self) -> bool {
        matches!(self, CoreError::ProcessSpawn(_))
    }

    /// Whether this error means the child started and exited unsuccessfully
    pub fn is_run_failure(&self) -> bool {
        matches!(self, CoreError::ProcessExit { .. })
    }
}

fn describe_exit(exit_code: &Option<i32>, signal: &Option<i32>) -> String {
    match (*exit_code, *signal) {
        (Some(code), _) => format!("exited with status {code}"),
        (None, Some(sig)) => format!("terminated by signal {}", signal_name(sig)),
        (None, None) => "exited with unknown status".to_string(),
    }
}

#[cfg(unix)]
fn signal_name(sig: i32) -> String {
    match nix::sys::signal::Signal::try_from(sig) {
        Ok(signal) => format!("{} ({sig})", signal.as_str()),
        Err(_) => sig.to_string(),
    }
}

#[cfg(not(unix))]
fn signal_name(sig: i32) -> String {
    sig.to_string()
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CoreError::ConfigurationError("test".to_string()).code(), "CORE001");
        assert_eq!(CoreError::ProcessSpawn("test".to_string()).code(), "CORE010");
        assert_eq!(
            CoreError::ProcessExit { exit_code: Some(3), signal: None }.code(),
            "CORE011"
        );
        assert_eq!(CoreError::Decode { encoding: "GB18030", len: 2 }.code(), "CORE020");
        assert_eq!(CoreError::Sink("test".to_string()).code(), "CORE021");
        assert_eq!(CoreError::InitializationError("test".to_string()).code(), "CORE003");
    }

    #[test]
    fn test_exit_display() {
        let error = CoreError::ProcessExit { exit_code: Some(3), signal: None };
        assert_eq!(error.to_string(), "Process exited with status 3");

        let error = CoreError::ProcessExit { exit_code: None, signal: None };
        assert_eq!(error.to_string(), "Process exited with unknown status");
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_display_names_signal() {
        let error = CoreError::ProcessExit { exit_code: None, signal: Some(9) };
        assert_eq!(error.to_string(), "Process terminated by signal SIGKILL (9)");
    }

    #[test]
    fn test_classification() {
        assert!(CoreError::ProcessSpawn("missing".into()).is_spawn());
        assert!(!CoreError::ProcessSpawn("missing".into()).is_run_failure());
        assert!(CoreError::ProcessExit { exit_code: Some(1), signal: None }.is_run_failure());
        assert!(!CoreError::Sink("full".into()).is_spawn());
    }
}
