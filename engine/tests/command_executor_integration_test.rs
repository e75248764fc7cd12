//! Integration tests for shell command execution
//!
//! These run real processes through the platform shell, so they are limited
//! to Unix where `/bin/bash` is available.
#![cfg(unix)]

use std::time::{Duration, Instant};
use tempfile::TempDir;

use sidekick_engine::command_executor::{CommandExecutor, BINARY_PLACEHOLDER, TRUNCATION_MARKER};
use sidekick_engine::config::ExecutionSettings;

fn settings(timeout_ms: u64, max_output_length: usize) -> ExecutionSettings {
    ExecutionSettings {
        max_iterations: 10,
        command_timeout_ms: timeout_ms,
        max_output_length,
    }
}

#[tokio::test]
async fn test_successful_command() {
    let dir = TempDir::new().unwrap();
    let executor = CommandExecutor::new(dir.path());

    let result = executor
        .execute("echo hello && echo oops 1>&2", &settings(5000, 4000))
        .await;

    assert_eq!(result.command, "echo hello && echo oops 1>&2");
    assert_eq!(result.stdout, "hello");
    assert_eq!(result.stderr, "oops");
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_failure_exit_code() {
    let dir = TempDir::new().unwrap();
    let executor = CommandExecutor::new(dir.path());

    let result = executor.execute("exit 3", &settings(5000, 4000)).await;
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stderr, "Command exited with code 3");

    let result = executor
        .execute("echo 'no such file' 1>&2; exit 2", &settings(5000, 4000))
        .await;
    assert_eq!(result.exit_code, 2);
    assert_eq!(result.stderr, "no such file");
}

#[tokio::test]
async fn test_output_truncated_to_limit() {
    let dir = TempDir::new().unwrap();
    let executor = CommandExecutor::new(dir.path());

    let result = executor
        .execute("printf 'x%.0s' $(seq 1 500)", &settings(5000, 100))
        .await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, format!("{}{}", "x".repeat(100), TRUNCATION_MARKER));
}

#[tokio::test]
async fn test_binary_output_replaced() {
    let dir = TempDir::new().unwrap();
    let executor = CommandExecutor::new(dir.path());

    let result = executor
        .execute("printf 'abc\\001def'", &settings(5000, 4000))
        .await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, BINARY_PLACEHOLDER);
}

#[tokio::test]
async fn test_binary_output_from_failing_command() {
    let dir = TempDir::new().unwrap();
    let executor = CommandExecutor::new(dir.path());

    let result = executor
        .execute("printf 'a\\001b'; exit 3", &settings(5000, 4000))
        .await;

    assert_eq!(result.stdout, BINARY_PLACEHOLDER);
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    let dir = TempDir::new().unwrap();
    let executor = CommandExecutor::new(dir.path());

    let started = Instant::now();
    let result = executor
        .execute("echo started; sleep 30; echo never", &settings(500, 4000))
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stdout, "started");
    assert_eq!(result.stderr, "Command timed out after 500ms");
}

#[tokio::test]
async fn test_timeout_kills_background_children() {
    let dir = TempDir::new().unwrap();
    let executor = CommandExecutor::new(dir.path());
    let marker = dir.path().join("survived");

    let command = format!("(sleep 2 && touch {}) & sleep 30", marker.display());
    let result = executor.execute(&command, &settings(300, 4000)).await;
    assert_eq!(result.exit_code, 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_working_directory_and_stdin() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("note.txt"), "from workspace").unwrap();
    let executor = CommandExecutor::new(dir.path());

    let result = executor.execute("cat note.txt", &settings(5000, 4000)).await;
    assert_eq!(result.stdout, "from workspace");

    // stdin is closed, so commands waiting for input finish immediately
    let result = executor.execute("cat", &settings(5000, 4000)).await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "");
}
