//! Log sinks for captured output and tracing initialisation
//!
//! Captured lines are handed to a [`LogSink`]. In the daemon this is a
//! [`TracingSink`], so child output and supervisor messages share the same
//! rotating file. Tests use [`MemorySink`].

use crate::rotation::RotatingFile;
use crate::{CoreError, Result};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Target used for events carrying captured child output
pub const OUTPUT_TARGET: &str = "tether::output";

/// Append-only destination for captured lines
pub trait LogSink: Send + Sync {
    /// Append one line of text
    fn write_line(&self, line: &str) -> Result<()>;
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn write_line(&self, line: &str) -> Result<()> {
        (**self).write_line(line)
    }
}

/// Forwards captured lines to the global tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&self, line: &str) -> Result<()> {
        info!(target: OUTPUT_TARGET, "{}", line);
        Ok(())
    }
}

/// In-memory sink that keeps every line it receives
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    fail_after: Option<usize>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that rejects every write after the first `n`
    pub fn failing_after(n: usize) -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            fail_after: Some(n),
        }
    }

    /// Snapshot of the lines written so far
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of lines written so far
    pub fn len(&self) -> usize {
        self.lines().len()
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &str) -> Result<()> {
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| CoreError::Sink("memory sink lock poisoned".to_string()))?;
        if let Some(limit) = self.fail_after {
            if lines.len() >= limit {
                return Err(CoreError::Sink(format!("memory sink full after {limit} lines")));
            }
        }
        lines.push(line.to_string());
        Ok(())
    }
}

/// Build the subscriber filter for `level`
///
/// `RUST_LOG` takes precedence over `level` when set. Captured output under
/// [`OUTPUT_TARGET`] is always enabled at info, whatever the level.
pub fn output_filter(level: &str) -> Result<EnvFilter> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let output = format!("{OUTPUT_TARGET}=info")
        .parse()
        .map_err(|e| CoreError::ConfigurationError(format!("invalid output directive: {e}")))?;
    Ok(filter.add_directive(output))
}

/// Initialise the global tracing subscriber, writing into `file`
pub fn init_tracing(level: &str, file: RotatingFile) -> Result<()> {
    let filter = output_filter(level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file)
        .with_ansi(false)
        .try_init()
        .map_err(|e| CoreError::InitializationError(e.to_string()))?;

    info!("Tracing initialized with level: {}", level);
    Ok(())
}
