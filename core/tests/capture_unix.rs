//! Integration tests for capturing real process output
//!
//! These tests verify that the capture runner, driving real processes:
//! - Delivers every line to the sink before the completion resolves
//! - Preserves emission order under volume
//! - Reports non-zero exits and missing executables as distinct errors

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;
use tether_core::encoding::Utf8Filter;
use tether_core::{CaptureRunner, CoreError, Invocation, MemorySink, SystemProcessAdapter};

fn runner(sink: &Arc<MemorySink>) -> CaptureRunner {
    CaptureRunner::new(
        Arc::new(SystemProcessAdapter::new()),
        Arc::new(Utf8Filter),
        sink.clone(),
    )
}

/// A process that prints and exits immediately must be fully captured
#[tokio::test]
async fn test_echo_is_captured_before_completion() {
    let sink = Arc::new(MemorySink::new());
    let completion = runner(&sink)
        .run_once(&Invocation::new("echo", ["hello"]))
        .await
        .expect("echo should succeed");
    let stats = completion.wait().await;

    assert_eq!(sink.lines(), vec!["hello"]);
    assert_eq!(stats.lines_written, 1);
}

/// Failing command: lines in order, then a RunError carrying the exit status
#[tokio::test]
async fn test_failing_command_output_and_status() {
    let sink = Arc::new(MemorySink::new());
    let result = runner(&sink)
        .run_once(&Invocation::new("sh", ["-c", "echo a; echo b; exit 3"]))
        .await;

    match result {
        Err(CoreError::ProcessExit { exit_code, .. }) => assert_eq!(exit_code, Some(3)),
        Err(e) => panic!("Expected ProcessExit error, got: {}", e),
        Ok(_) => panic!("Expected ProcessExit error, got success"),
    }
    assert_eq!(sink.lines(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_missing_executable_is_spawn_error() {
    let sink = Arc::new(MemorySink::new());
    let result = runner(&sink)
        .run_once(&Invocation::new("/nonexistent/tether-test-binary", Vec::<String>::new()))
        .await;

    match result {
        Err(e) => assert!(e.is_spawn(), "Expected ProcessSpawn error, got: {}", e),
        Ok(_) => panic!("Expected spawn failure"),
    }
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_high_volume_order_is_preserved() {
    let sink = Arc::new(MemorySink::new());
    let script = "i=0; while [ $i -lt 2000 ]; do echo line-$i; i=$((i+1)); done";
    runner(&sink)
        .run_once(&Invocation::new("sh", ["-c", script]))
        .await
        .expect("script should succeed")
        .wait()
        .await;

    let expected: Vec<String> = (0..2000).map(|i| format!("line-{i}")).collect();
    assert_eq!(sink.lines(), expected);
}

/// Output written while the process is still running reaches the sink early
#[tokio::test]
async fn test_output_is_streamed_while_running() {
    let sink = Arc::new(MemorySink::new());
    let runner = runner(&sink);
    let task = tokio::spawn(async move {
        let completion = runner
            .run_once(&Invocation::new("sh", ["-c", "echo early; sleep 2; echo late"]))
            .await?;
        Ok::<_, CoreError>(completion.wait().await)
    });

    let mut seen_early = false;
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if sink.lines() == vec!["early"] {
            seen_early = true;
            break;
        }
    }
    assert!(seen_early, "first line should arrive before the process exits");

    task.await.unwrap().expect("script should succeed");
    assert_eq!(sink.lines(), vec!["early", "late"]);
}

#[tokio::test]
async fn test_stderr_is_not_captured() {
    let sink = Arc::new(MemorySink::new());
    runner(&sink)
        .run_once(&Invocation::new("sh", ["-c", "echo out; echo err >&2"]))
        .await
        .unwrap()
        .wait()
        .await;
    assert_eq!(sink.lines(), vec!["out"]);
}

/// A background grandchild inherits stdout; the run must still end with the child
#[tokio::test]
async fn test_background_grandchild_does_not_hold_failed_run() {
    let sink = Arc::new(MemorySink::new());
    let runner = runner(&sink).with_drain_timeout(Duration::from_millis(500));
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        runner.run_once(&Invocation::new("sh", ["-c", "sleep 20 & echo hi; exit 3"])),
    )
    .await
    .expect("run_once should return soon after the child exits");

    match result {
        Err(CoreError::ProcessExit { exit_code, .. }) => assert_eq!(exit_code, Some(3)),
        Err(e) => panic!("Expected ProcessExit error, got: {}", e),
        Ok(_) => panic!("Expected ProcessExit error, got success"),
    }
    assert_eq!(sink.lines(), vec!["hi"]);
}

#[tokio::test]
async fn test_background_grandchild_does_not_hold_clean_run() {
    let sink = Arc::new(MemorySink::new());
    let runner = runner(&sink).with_drain_timeout(Duration::from_millis(500));
    let stats = tokio::time::timeout(Duration::from_secs(5), async {
        let completion = runner
            .run_once(&Invocation::new("sh", ["-c", "sleep 20 & echo hi"]))
            .await
            .expect("script should succeed");
        completion.wait().await
    })
    .await
    .expect("completion should resolve soon after the child exits");

    assert!(stats.reader_abandoned);
    assert_eq!(sink.lines(), vec!["hi"]);
}
