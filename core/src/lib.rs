//! Core functionality for tether
//!
//! This crate contains the supervision machinery used by the `tether`
//! binary: the capture runner that streams a child's stdout into a log sink,
//! the restart loop around it, and the signal controller that decides when
//! and how the supervisor exits.

pub mod encoding;
pub mod error;
pub mod invocation;
pub mod logging;
pub mod process;
pub mod rotation;
pub mod signals;
pub mod supervisor;


pub use encoding::{filter_for, Encoding, LineFilter};
pub use error::{CoreError, Result};
pub use invocation::{Invocation, ProcessExit};
pub use logging::{LogSink, MemorySink, TracingSink};
pub use rotation::{RotatingFile, RotationPolicy};
pub use signals::{OsSignals, ShutdownSignal, SignalController, SignalSource};
pub use supervisor::{
    lifecycle, spawn_supervisor, CaptureRunner, CaptureStats, Completion, SupervisorConfig,
    SupervisorReport, SupervisorState, SystemProcessAdapter,
};
