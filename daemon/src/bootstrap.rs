//! Daemon bootstrap: resolve arguments and bring up the log sink
//!
//! Everything here runs before supervision starts, and every failure here is
//! fatal: the daemon refuses to run without a command or without somewhere to
//! write its log.

use crate::cli::Cli;
use crate::{DaemonError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{Encoding, Invocation, RotatingFile, RotationPolicy};

/// Fully resolved runtime settings
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Command to supervise
    pub invocation: Arc<Invocation>,
    /// Directory for the rotating log files
    pub log_dir: PathBuf,
    /// Base name of the log files
    pub log_prefix: String,
    /// Default tracing filter
    pub log_level: String,
    /// Rotation interval and retention
    pub rotation: RotationPolicy,
    /// Pause between runs
    pub backoff: Duration,
    /// Pause between a shutdown decision and exit
    pub grace: Duration,
    /// Encoding of the command's output
    pub encoding: Encoding,
}

impl TryFrom<Cli> for RuntimeConfig {
    type Error = DaemonError;

    fn try_from(cli: Cli) -> Result<Self> {
        let invocation = Invocation::from_argv(&cli.command)
            .ok_or_else(|| DaemonError::InvalidArguments("no executable given".to_string()))?;
        if invocation.program.is_empty() {
            return Err(DaemonError::InvalidArguments(
                "executable name is empty".to_string(),
            ));
        }

        Ok(Self {
            invocation: Arc::new(invocation),
            log_dir: cli.log_dir,
            log_prefix: cli.log_prefix,
            log_level: cli.log_level,
            rotation: RotationPolicy::default(),
            backoff: Duration::from_secs(cli.backoff_secs),
            grace: Duration::from_millis(cli.grace_ms),
            encoding: cli.encoding,
        })
    }
}

/// Open the rotating log file and install the tracing subscriber
///
/// Must be called once, before any other component logs.
pub fn init_logging(config: &RuntimeConfig) -> Result<RotatingFile> {
    let file = RotatingFile::open(&config.log_dir, config.log_prefix.as_str(), config.rotation)?;
    tether_core::logging::init_tracing(&config.log_level, file.clone())?;
    Ok(file)
}
