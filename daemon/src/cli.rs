//! Command-line arguments

use clap::Parser;
use std::path::PathBuf;
use tether_core::Encoding;

/// Keep a command running and log its output
#[derive(Parser, Debug, Clone)]
#[command(name = "tether")]
#[command(about = "Keep a command running, restarting it whenever it exits, and log its stdout")]
#[command(version)]
pub struct Cli {
    /// Directory for the rotating log files
    #[arg(long, env = "TETHER_LOG_DIR", default_value = ".")]
    pub log_dir: PathBuf,

    /// Base name of the log files; also the name of the link to the current file
    #[arg(long, default_value = "log")]
    pub log_prefix: String,

    /// Log level filter (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Seconds to wait before restarting the command
    #[arg(long, default_value_t = 10)]
    pub backoff_secs: u64,

    /// Milliseconds to wait between a shutdown signal and exit
    #[arg(long, default_value_t = 1000)]
    pub grace_ms: u64,

    /// Encoding of the command's output: auto, utf8 or gb18030
    #[arg(long, default_value = "auto")]
    pub encoding: Encoding,

    /// Executable to supervise, followed by its arguments
    #[arg(
        value_name = "EXECUTABLE",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}
