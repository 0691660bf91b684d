//! Value types describing what is supervised and how it ended

use std::fmt;

/// The command under supervision: an executable plus its arguments.
///
/// Supplied once at startup and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable name or path (resolved through `PATH` when relative)
    pub program: String,
    /// Arguments passed verbatim to the executable
    pub args: Vec<String>,
}

impl Invocation {
    /// Create a new invocation
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build an invocation from a full argv-style list (`[program, args...]`).
    ///
    /// Returns `None` when the list is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Process ID of the exited child
    pub pid: u32,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Terminating signal number (Unix only)
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
