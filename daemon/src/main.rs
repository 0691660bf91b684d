//! tether binary
//!
//! `tether [OPTIONS] <EXECUTABLE> [ARGS]...`

#![allow(unused_crate_dependencies)]

use clap::Parser;
use daemon::bootstrap::init_logging;
use daemon::cli::Cli;
use daemon::{Daemon, RuntimeConfig};
use tether_core::signals::EXIT_FORCED;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_FORCED } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let config = match RuntimeConfig::try_from(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tether: {e}");
            std::process::exit(EXIT_FORCED);
        }
    };

    // Nothing can be logged until the sink exists, so failures go to stderr.
    let log_file = match init_logging(&config) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("tether: failed to initialize log: {e}");
            std::process::exit(EXIT_FORCED);
        }
    };

    info!(
        "Starting tether {} for '{}', logging to {}",
        env!("CARGO_PKG_VERSION"),
        config.invocation,
        log_file.current_path().display()
    );

    let code = match Daemon::new(config).run().await {
        Ok(code) => code,
        Err(e) => {
            error!("Supervisor failed: {}", e);
            EXIT_FORCED
        }
    };

    std::process::exit(code);
}
