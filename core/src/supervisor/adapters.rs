//! Process adapters for abstracting process management
//!
//! The capture runner only needs three things from a child: its PID, its
//! stdout and its exit. [`ProcessAdapter`] hides how the child is produced so
//! the runner and loop can be driven by [`MockProcessAdapter`] in tests.

use crate::{CoreError, Invocation, ProcessExit, Result};
use async_trait::async_trait;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Boxed stdout stream handed to the line reader
pub type OutputStream = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Trait for starting processes in a platform-agnostic way
#[async_trait]
pub trait ProcessAdapter: Send + Sync {
    /// Start a new process for `invocation`
    async fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn ManagedProcess>>;
}

/// A running process whose output can be read and whose exit can be awaited
#[async_trait]
pub trait ManagedProcess: Send + Sync {
    /// Get the process ID
    fn pid(&self) -> u32;

    /// Wait for the process to exit
    async fn wait(&mut self) -> Result<ProcessExit>;

    /// Take a readable handle to the child's stdout.
    /// Returns None if stdout was not piped or already taken.
    fn take_stdout(&mut self) -> Option<OutputStream>;
}

/// Adapter that starts real OS processes
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemProcessAdapter;

impl SystemProcessAdapter {
    /// Create a new system process adapter
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessAdapter for SystemProcessAdapter {
    async fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn ManagedProcess>> {
        let child = crate::process::spawn(invocation)?;
        Ok(Box::new(SystemManagedProcess { child }))
    }
}

struct SystemManagedProcess {
    child: crate::process::ChildProcess,
}

#[async_trait]
impl ManagedProcess for SystemManagedProcess {
    fn pid(&self) -> u32 {
        self.child.pid()
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        self.child.wait().await
    }

    fn take_stdout(&mut self) -> Option<OutputStream> {
        self.child.take_stdout().map(|s| {
            let r: OutputStream = Box::pin(s);
            r
        })
    }
}

/// Instructions for mock process behavior
#[derive(Debug, Clone)]
pub struct MockInstruction {
    /// Fail the spawn instead of producing a process
    pub fail_spawn: bool,
    /// How long to wait before the process "exits"
    pub exit_delay: Duration,
    /// Exit code to return (None means killed by signal)
    pub exit_code: Option<i32>,
    /// Signal that killed the process (Unix only)
    pub signal: Option<i32>,
    /// Bytes the process writes to stdout
    pub stdout: Vec<u8>,
    /// Keep stdout open after exit, like a background grandchild would
    pub stdout_held_open: bool,
}

impl Default for MockInstruction {
    fn default() -> Self {
        Self {
            fail_spawn: false,
            exit_delay: Duration::from_millis(100),
            exit_code: Some(0),
            signal: None,
            stdout: Vec::new(),
            stdout_held_open: false,
        }
    }
}

impl MockInstruction {
    /// A process that prints `stdout` and exits with `exit_code`
    pub fn exits(exit_code: i32, stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// A process that cannot be started
    pub fn spawn_failure() -> Self {
        Self {
            fail_spawn: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct MockCounters {
    spawned: AtomicUsize,
    spawn_attempts: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    held_pipes: std::sync::Mutex<Vec<tokio::io::DuplexStream>>,
}

/// Mock process adapter for testing
///
/// Instructions are consumed in order; once the queue is empty the fallback
/// instruction is used for every further spawn.
#[derive(Debug, Clone)]
pub struct MockProcessAdapter {
    instructions: Arc<tokio::sync::Mutex<Vec<MockInstruction>>>,
    fallback: MockInstruction,
    counters: Arc<MockCounters>,
}

impl MockProcessAdapter {
    /// Create a new mock adapter with no pre-configured instructions
    pub fn new() -> Self {
        Self::with_instructions(Vec::new())
    }

    /// Create a mock adapter that replays `instructions` in order
    pub fn with_instructions(instructions: Vec<MockInstruction>) -> Self {
        Self {
            instructions: Arc::new(tokio::sync::Mutex::new(instructions)),
            fallback: MockInstruction::default(),
            counters: Arc::new(MockCounters::default()),
        }
    }

    /// Create a mock adapter that behaves the same on every spawn
    pub fn repeating(instruction: MockInstruction) -> Self {
        let mut adapter = Self::new();
        adapter.fallback = instruction;
        adapter
    }

    /// Add instructions for the next spawned process
    pub async fn add_instruction(&self, instruction: MockInstruction) {
        let mut instructions = self.instructions.lock().await;
        instructions.push(instruction);
    }

    /// Number of spawn calls, successful or not
    pub fn spawn_attempts(&self) -> usize {
        self.counters.spawn_attempts.load(Ordering::SeqCst)
    }

    /// Number of processes successfully spawned
    pub fn spawned(&self) -> usize {
        self.counters.spawned.load(Ordering::SeqCst)
    }

    /// Number of process handles currently alive
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously alive process handles observed
    pub fn max_active(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }
}

impl Default for MockProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessAdapter for MockProcessAdapter {
    async fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn ManagedProcess>> {
        debug!("Spawning mock process for: {} {:?}", invocation.program, invocation.args);
        self.counters.spawn_attempts.fetch_add(1, Ordering::SeqCst);

        let instruction = {
            let mut instructions = self.instructions.lock().await;
            if instructions.is_empty() {
                self.fallback.clone()
            } else {
                instructions.remove(0)
            }
        };

        if instruction.fail_spawn {
            return Err(CoreError::ProcessSpawn(format!(
                "Failed to spawn '{}': No such file or directory (mock)",
                invocation.program
            )));
        }

        let seq = self.counters.spawned.fetch_add(1, Ordering::SeqCst);
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_active.fetch_max(active, Ordering::SeqCst);

        let pid = 1000 + seq as u32;
        Ok(Box::new(MockManagedProcess {
            pid,
            stdout: Some(instruction.stdout.clone()),
            instruction,
            counters: self.counters.clone(),
        }))
    }
}

/// Mock managed process for testing
struct MockManagedProcess {
    pid: u32,
    instruction: MockInstruction,
    stdout: Option<Vec<u8>>,
    counters: Arc<MockCounters>,
}

impl Drop for MockManagedProcess {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ManagedProcess for MockManagedProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        tokio::time::sleep(self.instruction.exit_delay).await;
        Ok(ProcessExit {
            pid: self.pid,
            exit_code: self.instruction.exit_code,
            signal: self.instruction.signal,
        })
    }

    fn take_stdout(&mut self) -> Option<OutputStream> {
        let bytes = self.stdout.take()?;
        let written = std::io::Cursor::new(bytes);
        if !self.instruction.stdout_held_open {
            return Some(Box::pin(written));
        }

        // The writer half outlives the process, so the reader never sees EOF
        let (writer, reader) = tokio::io::duplex(64);
        if let Ok(mut held) = self.counters.held_pipes.lock() {
            held.push(writer);
        }
        Some(Box::pin(written.chain(reader)))
    }
}
