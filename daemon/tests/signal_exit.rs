//! End-to-end tests against the built `tether` binary
//!
//! Each test gets its own log directory and sends real signals to the
//! supervisor process.

#![cfg(unix)]

mod common;

use common::TetherProcess;
use nix::sys::signal::Signal;
use std::process::Command;
use std::time::{Duration, Instant};

#[test]
fn test_interrupt_exits_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut tether = TetherProcess::start(dir.path(), &["sh", "-c", "echo hello"]);

    assert!(
        tether.wait_for_log("hello", 1, Duration::from_secs(5)),
        "child output never reached the log: {}",
        tether.log()
    );

    let sent = Instant::now();
    tether.signal(Signal::SIGINT);
    let status = tether
        .wait_for_exit(Duration::from_secs(3))
        .expect("tether should exit after SIGINT");

    assert_eq!(status.code(), Some(0));
    assert!(sent.elapsed() >= Duration::from_millis(900));
    assert!(sent.elapsed() < Duration::from_millis(2500));
    assert!(tether.log().contains("Supervisor exiting with code 0"));
}

#[test]
fn test_terminate_while_child_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut tether = TetherProcess::start(dir.path(), &["sh", "-c", "echo started; sleep 5"]);

    assert!(tether.wait_for_log("started", 1, Duration::from_secs(5)));
    tether.signal(Signal::SIGTERM);

    let status = tether
        .wait_for_exit(Duration::from_secs(3))
        .expect("tether should exit while the child is still sleeping");
    assert_eq!(status.code(), Some(0));
}

#[test]
fn test_quit_exits_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut tether = TetherProcess::start(dir.path(), &["true"]);

    assert!(tether.wait_for_log("Supervising", 1, Duration::from_secs(5)));
    tether.signal(Signal::SIGQUIT);

    let status = tether.wait_for_exit(Duration::from_secs(3)).expect("exit after SIGQUIT");
    assert_eq!(status.code(), Some(0));
}

#[test]
fn test_hangup_is_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut tether = TetherProcess::start(dir.path(), &["sh", "-c", "echo tick"]);

    assert!(tether.wait_for_log("tick", 1, Duration::from_secs(5)));
    tether.signal(Signal::SIGHUP);

    // Still running, and still restarting the command after the hangup
    let ticks = tether.log().matches("tick").count();
    assert!(
        tether.wait_for_log("tick", ticks + 1, Duration::from_secs(5)),
        "no restart after SIGHUP: {}",
        tether.log()
    );
    assert!(tether.is_running());
    assert!(tether.log().contains("Received SIGHUP, ignoring"));

    tether.signal(Signal::SIGINT);
    let status = tether.wait_for_exit(Duration::from_secs(3)).expect("exit after SIGINT");
    assert_eq!(status.code(), Some(0));
}

#[test]
fn test_failing_command_is_restarted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let tether = TetherProcess::start(dir.path(), &["sh", "-c", "echo a; echo b; exit 3"]);

    assert!(
        tether.wait_for_log("exited with status 3", 2, Duration::from_secs(6)),
        "expected two failed runs: {}",
        tether.log()
    );

    let log = tether.log();
    let a = log.find("INFO tether::output: a").expect("line a logged");
    let b = log.find("INFO tether::output: b").expect("line b logged");
    assert!(a < b);
}

#[test]
fn test_output_is_logged_at_quiet_level() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut tether = TetherProcess::start_with_options(
        dir.path(),
        &["--log-level", "warn"],
        &["sh", "-c", "echo quiet_hello"],
    );

    assert!(
        tether.wait_for_log("quiet_hello", 1, Duration::from_secs(5)),
        "captured output was filtered out: {}",
        tether.log()
    );
    assert!(!tether.log().contains("Supervising"));

    tether.signal(Signal::SIGINT);
    let status = tether.wait_for_exit(Duration::from_secs(3)).expect("exit after SIGINT");
    assert_eq!(status.code(), Some(0));
}

#[test]
fn test_missing_executable_is_retried() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut tether = TetherProcess::start(dir.path(), &["/nonexistent/tether-test-binary"]);

    assert!(
        tether.wait_for_log("Failed to start", 2, Duration::from_secs(6)),
        "expected repeated spawn failures: {}",
        tether.log()
    );
    assert!(tether.is_running());
}

#[test]
fn test_no_executable_exits_one() {
    let status = Command::new(env!("CARGO_BIN_EXE_tether"))
        .output()
        .expect("run tether")
        .status;
    assert_eq!(status.code(), Some(1));
}

#[test]
fn test_help_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_tether"))
        .arg("--help")
        .output()
        .expect("run tether");
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("EXECUTABLE"));
}

#[test]
fn test_unusable_log_dir_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tether"))
        .arg("--log-dir")
        .arg(blocker.join("logs"))
        .arg("true")
        .output()
        .expect("run tether");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to initialize log"));
}
