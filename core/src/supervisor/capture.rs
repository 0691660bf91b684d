//! Capture runner: one supervised invocation from spawn to drained output
//!
//! [`CaptureRunner::run_once`] starts the child, hands its stdout to a
//! dedicated reader task and waits for the child to exit. The reader decodes
//! each line with the configured [`LineFilter`] and appends it to the
//! [`LogSink`] as soon as it arrives.
//!
//! The returned [`Completion`] resolves once the reader has seen the end of
//! the stream, so everything the child wrote is in the sink before the caller
//! moves on. On a failed exit the runner drains the reader itself before
//! returning the error.
//!
//! A background grandchild can inherit the pipe and keep it open long after
//! the child is gone. Draining is therefore bounded: the reader gets
//! [`DEFAULT_DRAIN_TIMEOUT`] after the child's exit, then it is abandoned.

use super::adapters::{OutputStream, ProcessAdapter};
use crate::encoding::LineFilter;
use crate::logging::LogSink;
use crate::{CoreError, Invocation, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Longest chunk handed to the filter; longer lines are split
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// How long the reader may keep draining after the child has exited
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Counters produced by a reader task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Lines accepted by the sink
    pub lines_written: u64,
    /// Lines lost to decode or sink failures
    pub lines_dropped: u64,
    /// Raw bytes read from the stream
    pub bytes_read: u64,
    /// The stream was still open when the drain timeout expired
    pub reader_abandoned: bool,
}

type SharedStats = Arc<Mutex<CaptureStats>>;

fn update(stats: &SharedStats, f: impl FnOnce(&mut CaptureStats)) {
    match stats.lock() {
        Ok(mut guard) => f(&mut guard),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}

fn snapshot(stats: &SharedStats) -> CaptureStats {
    match stats.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Handle that resolves once a child's output has been drained
#[derive(Debug)]
pub struct Completion {
    pid: u32,
    reader: Option<JoinHandle<()>>,
    stats: SharedStats,
    deadline: Instant,
}

impl Completion {
    /// PID of the process this completion belongs to
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the reader task to observe end-of-stream
    ///
    /// Gives up at the drain deadline; the reader is then aborted, which
    /// closes our end of the pipe.
    pub async fn wait(self) -> CaptureStats {
        let Completion {
            pid,
            reader,
            stats,
            deadline,
        } = self;

        if let Some(mut reader) = reader {
            match tokio::time::timeout_at(deadline, &mut reader).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Output reader for process {} failed: {}", pid, e),
                Err(_) => {
                    reader.abort();
                    update(&stats, |s| s.reader_abandoned = true);
                    warn!(
                        "Output of process {} still open after exit, abandoning reader",
                        pid
                    );
                }
            }
        }
        snapshot(&stats)
    }
}

/// Runs one invocation at a time, streaming its stdout into a sink
#[derive(Clone)]
pub struct CaptureRunner {
    adapter: Arc<dyn ProcessAdapter>,
    filter: Arc<dyn LineFilter>,
    sink: Arc<dyn LogSink>,
    drain_timeout: Duration,
}

impl CaptureRunner {
    /// Create a runner from its three collaborators
    pub fn new(
        adapter: Arc<dyn ProcessAdapter>,
        filter: Arc<dyn LineFilter>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            adapter,
            filter,
            sink,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Override how long output is drained after the child exits
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Start `invocation`, capture its output and wait for it to exit
    ///
    /// # Errors
    /// - [`CoreError::ProcessSpawn`] if the process could not be started; no
    ///   reader is started in that case.
    /// - [`CoreError::ProcessExit`] if it exited with a non-zero status or was
    ///   killed by a signal. Output has been drained when this is returned.
    /// - [`CoreError::ProcessWait`] if waiting on the child failed.
    pub async fn run_once(&self, invocation: &Invocation) -> Result<Completion> {
        let mut process = self.adapter.spawn(invocation).await?;
        let pid = process.pid();
        info!("Started '{}' as process {}", invocation, pid);

        let stats = SharedStats::default();
        let reader = match process.take_stdout() {
            Some(stream) => Some(self.spawn_line_reader(stream, pid, stats.clone())),
            None => {
                warn!("Process {} has no stdout to capture", pid);
                None
            }
        };

        let exit = process.wait().await;
        drop(process);

        let completion = Completion {
            pid,
            reader,
            stats,
            deadline: Instant::now() + self.drain_timeout,
        };

        match exit {
            Ok(exit) if exit.success() => {
                debug!("Process {} exited successfully", pid);
                Ok(completion)
            }
            Ok(exit) => {
                let stats = completion.wait().await;
                debug!("Process {} output drained: {:?}", pid, stats);
                Err(CoreError::ProcessExit {
                    exit_code: exit.exit_code,
                    signal: exit.signal,
                })
            }
            Err(e) => {
                completion.wait().await;
                Err(e)
            }
        }
    }

    fn spawn_line_reader(&self, stream: OutputStream, pid: u32, stats: SharedStats) -> JoinHandle<()> {
        let filter = self.filter.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            pump_lines(stream, filter.as_ref(), sink.as_ref(), pid, &stats).await
        })
    }
}

/// Read `stream` line by line until it closes, forwarding every line
///
/// A line longer than [`MAX_LINE_BYTES`] is forwarded in pieces. Each cut is
/// moved back to a character boundary, and the newline that ends a line cut
/// exactly at the limit does not produce an extra empty line.
async fn pump_lines(
    stream: OutputStream,
    filter: &dyn LineFilter,
    sink: &dyn LogSink,
    pid: u32,
    stats: &SharedStats,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(1024);
    let mut carry = Vec::new();
    let mut continued = false;

    loop {
        buf.clear();
        buf.append(&mut carry);
        let limit = (MAX_LINE_BYTES - buf.len()) as u64;
        let read = (&mut reader).take(limit).read_until(b'\n', &mut buf).await;
        let n = match read {
            Ok(n) => n,
            Err(e) => {
                warn!("Error reading output of process {}: {}", pid, e);
                break;
            }
        };
        update(stats, |s| s.bytes_read += n as u64);

        if n == 0 && buf.is_empty() {
            break;
        }

        let ends_line = buf.ends_with(b"\n");
        if ends_line && continued && trim_line_ending(&buf).is_empty() {
            continued = false;
            continue;
        }

        let at_cap = n > 0 && !ends_line && buf.len() >= MAX_LINE_BYTES;
        if at_cap {
            let keep = filter.complete_prefix(&buf);
            if keep > 0 {
                carry.extend_from_slice(&buf[keep..]);
                buf.truncate(keep);
            }
        }
        continued = at_cap;

        forward_line(&buf, filter, sink, pid, stats);

        if n == 0 {
            break;
        }
    }

    debug!("Output stream of process {} closed", pid);
}

fn forward_line(raw: &[u8], filter: &dyn LineFilter, sink: &dyn LogSink, pid: u32, stats: &SharedStats) {
    match filter.decode(trim_line_ending(raw)) {
        Ok(line) => match sink.write_line(&line) {
            Ok(()) => update(stats, |s| s.lines_written += 1),
            Err(e) => {
                warn!("Dropping output line of process {}: {}", pid, e);
                update(stats, |s| s.lines_dropped += 1);
            }
        },
        Err(e) => {
            warn!("Dropping output line of process {}: {} ({:?})", pid, e, raw);
            update(stats, |s| s.lines_dropped += 1);
        }
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
