//! Integration tests for action dispatch
//!
//! Drives [`ActionDispatcher`] through the same entry point the agent loop
//! uses, against a fake desktop that records what it was asked to do.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use sidekick_engine::command_executor::CommandExecutor;
use sidekick_engine::config::ExecutionSettings;
use sidekick_engine::tools::{ActionDispatcher, ActionRunner, Desktop, PointerAction, ToolCall};

#[derive(Default)]
struct FakeDesktop {
    events: Mutex<Vec<String>>,
    broken: bool,
}

impl FakeDesktop {
    fn record(&self, event: String) -> Result<()> {
        if self.broken {
            bail!("xdotool: failed to start");
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[async_trait]
impl Desktop for FakeDesktop {
    async fn capture_screen(&self, path: &Path) -> Result<()> {
        self.record(format!("capture {}", path.display()))?;
        tokio::fs::write(path, b"png").await?;
        Ok(())
    }

    async fn pointer(&self, x: f64, y: f64, action: PointerAction) -> Result<()> {
        self.record(format!("{} {} {}", action.as_str(), x, y))
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.record(format!("type {}", text))
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        self.record(format!("url {}", url))
    }

    async fn open_app(&self, app: &str) -> Result<()> {
        self.record(format!("app {}", app))
    }
}

fn dispatcher(dir: &TempDir, desktop: Arc<FakeDesktop>) -> ActionDispatcher {
    ActionDispatcher::new(
        CommandExecutor::new(dir.path()),
        desktop,
        dir.path().join("screenshots"),
    )
}

#[tokio::test]
async fn test_open_url_result() {
    let dir = TempDir::new().unwrap();
    let desktop = Arc::new(FakeDesktop::default());
    let call = ToolCall::new("open_url", json!({"url": "https://example.com"}));

    let result = dispatcher(&dir, desktop.clone())
        .run("", Some(&call), &ExecutionSettings::default())
        .await;

    assert_eq!(result.command, "open_url: https://example.com");
    assert_eq!(result.stdout, "Opened https://example.com");
    assert_eq!(result.stderr, "");
    assert_eq!(result.exit_code, 0);
    assert_eq!(
        *desktop.events.lock().unwrap(),
        vec!["url https://example.com"]
    );
}

#[tokio::test]
async fn test_unknown_tool_fails_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let desktop = Arc::new(FakeDesktop::default());
    let call = ToolCall::new("teleport", json!({}));

    let result = dispatcher(&dir, desktop.clone())
        .run("", Some(&call), &ExecutionSettings::default())
        .await;

    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "Unknown tool: teleport");
    assert!(desktop.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_params_rejected() {
    let dir = TempDir::new().unwrap();
    let desktop = Arc::new(FakeDesktop::default());
    let d = dispatcher(&dir, desktop.clone());
    let settings = ExecutionSettings::default();

    let cases = [
        ("mouse_click", json!({"x": 10}), "Numeric x and y coordinates are required"),
        ("keyboard_type", json!({}), "Text is required"),
        ("open_url", json!({"url": ""}), "URL is required"),
        ("open_app", json!({}), "App name is required"),
    ];

    for (tool, params, reason) in cases {
        let call = ToolCall::new(tool, params);
        let result = d.run("", Some(&call), &settings).await;
        assert_eq!(result.exit_code, 1, "{}", tool);
        assert_eq!(result.stderr, reason, "{}", tool);
    }
    assert!(desktop.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_pointer_and_keyboard() {
    let dir = TempDir::new().unwrap();
    let desktop = Arc::new(FakeDesktop::default());
    let d = dispatcher(&dir, desktop.clone());
    let settings = ExecutionSettings::default();

    let click = ToolCall::new("mouse_click", json!({"x": 100, "y": 200}));
    let result = d.run("", Some(&click), &settings).await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "Performed click at (100, 200)");

    let typing = ToolCall::new("keyboard_type", json!({"text": "hello"}));
    let result = d.run("", Some(&typing), &settings).await;
    assert_eq!(result.stdout, "Typed: \"hello\"");

    assert_eq!(
        *desktop.events.lock().unwrap(),
        vec!["click 100 200", "type hello"]
    );
}

#[tokio::test]
async fn test_screenshot_writes_file() {
    let dir = TempDir::new().unwrap();
    let desktop = Arc::new(FakeDesktop::default());
    let call = ToolCall::new("screenshot", json!({"filename": "../escape.png"}));

    let result = dispatcher(&dir, desktop)
        .run("", Some(&call), &ExecutionSettings::default())
        .await;

    let expected = dir.path().join("screenshots").join("escape.png");
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, expected.to_string_lossy());
    assert!(expected.exists());
}

#[tokio::test]
async fn test_desktop_failure_carries_hint() {
    let dir = TempDir::new().unwrap();
    let desktop = Arc::new(FakeDesktop {
        broken: true,
        ..FakeDesktop::default()
    });
    let call = ToolCall::new("keyboard_type", json!({"text": "hi"}));

    let result = dispatcher(&dir, desktop)
        .run("", Some(&call), &ExecutionSettings::default())
        .await;

    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.starts_with("xdotool: failed to start"));
    assert!(result.stderr.contains("\nHint: "));
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_runs_in_workspace() {
    let dir = TempDir::new().unwrap();
    let desktop = Arc::new(FakeDesktop::default());

    let result = dispatcher(&dir, desktop)
        .run("pwd", None, &ExecutionSettings::default())
        .await;

    assert_eq!(result.exit_code, 0);
    let reported = std::fs::canonicalize(result.stdout.trim()).unwrap();
    assert_eq!(reported, dir.path().canonicalize().unwrap());
}
