//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - start: Serve Telegram messages until interrupted
//! - run: Execute a task immediately
//! - history: Show last N tasks
//! - settings: Show the effective execution settings

use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::errors::EngineError;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{AgentLoop, AgentTaskProcessor, Planner, ReplySink};
use crate::bot::{TelegramApi, TelegramBot};
use crate::command_executor::CommandExecutor;
use crate::config::{Config, ExecutionSettings, SettingsSource};
use crate::db::{Database, Task, TaskStatus};
use crate::llm::openai::OpenAIProvider;
use crate::queue::TaskQueue;
use crate::tools::{ActionDispatcher, SystemDesktop};
use crate::transcriber::Transcriber;

/// Sender recorded for tasks submitted with `sidekick run`.
pub const CLI_SENDER: &str = "cli";

/// How long `start` waits for the running task after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn require_secret(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(EngineError::MissingSecret(name.to_string()).into()),
    }
}

/// Build the agent loop wired to the real desktop and reasoning service.
pub fn build_agent(config: &Config, api_key: &str) -> Result<AgentLoop> {
    let paths = config.paths();
    let provider = OpenAIProvider::new(config.llm.clone(), api_key)?;
    let planner = Planner::new(
        Arc::new(provider),
        &config.core.workspace,
        Duration::from_secs(config.llm.request_timeout_secs),
    );
    let dispatcher = ActionDispatcher::new(
        CommandExecutor::new(config.core.workspace.clone()),
        Arc::new(SystemDesktop::new()),
        paths.screenshots_dir.clone(),
    );

    Ok(AgentLoop::new(
        planner,
        Arc::new(dispatcher),
        SettingsSource::File(paths.settings_path),
    ))
}

/// Serve tasks from Telegram
///
/// Opens the store (which requeues tasks interrupted by a previous crash),
/// registers the agent processor and polls Telegram until Ctrl-C or SIGTERM.
/// The task in flight gets a bounded grace period before the database closes.
pub async fn handle_start(
    config: &Config,
    api_key: Option<String>,
    telegram_token: Option<String>,
) -> Result<()> {
    let api_key = require_secret(api_key, "OPENAI_API_KEY")?;
    let token = require_secret(telegram_token, "TELEGRAM_BOT_TOKEN")?;

    if config.telegram.allowed_users.is_empty() {
        tracing::warn!("telegram.allowed_users is empty; every sender will be refused");
    }

    let paths = config.paths();
    let database = Database::new(&paths.db_path)
        .await
        .context("Failed to open database")?;
    let queue = TaskQueue::new(database.tasks()).await?;

    let api = TelegramApi::new(
        &config.telegram.api_base,
        &token,
        Duration::from_secs(config.telegram.poll_timeout_secs),
    )?;
    let agent = build_agent(config, &api_key)?;
    queue
        .set_processor(Arc::new(AgentTaskProcessor::new(agent, Arc::new(api.clone()))))
        .await?;

    let transcriber = Arc::new(Transcriber::new(&config.llm, api_key)?);
    let bot = TelegramBot::new(api, &config.telegram, queue.clone(), transcriber);

    println!("Sidekick started (PID {})", std::process::id());

    tokio::select! {
        result = bot.start_polling() => {
            result.context("Telegram polling stopped")?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown requested");
        }
    }

    if tokio::time::timeout(SHUTDOWN_GRACE, queue.wait_until_idle())
        .await
        .is_err()
    {
        tracing::warn!(
            "Task still running after {}s; it will be retried on next start",
            SHUTDOWN_GRACE.as_secs()
        );
    }

    database.close().await?;
    println!("Sidekick stopped.");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}

/// Prints replies for `sidekick run`.
///
/// Tasks from other senders that are drained in the same run are logged
/// instead of printed.
struct ConsoleSink {
    format: OutputFormat,
}

#[async_trait]
impl ReplySink for ConsoleSink {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()> {
        if recipient != CLI_SENDER {
            tracing::warn!(recipient, "Reply not delivered outside the bot");
            return Ok(());
        }
        if let OutputFormat::Text = self.format {
            println!("{}", text);
        }
        Ok(())
    }

    async fn send_file(&self, recipient: &str, path: &Path) -> Result<()> {
        if recipient != CLI_SENDER {
            return Ok(());
        }
        if let OutputFormat::Text = self.format {
            println!("File: {}", path.display());
        }
        Ok(())
    }
}

/// Run a task immediately
///
/// The message goes through the same durable queue and agent as Telegram
/// tasks, with `cli` as the sender.
pub async fn handle_run(
    message: String,
    config: &Config,
    api_key: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let api_key = require_secret(api_key, "OPENAI_API_KEY")?;

    let paths = config.paths();
    let database = Database::new(&paths.db_path)
        .await
        .context("Failed to open database")?;
    let queue = TaskQueue::new(database.tasks()).await?;

    let agent = build_agent(config, &api_key)?;
    let sink = Arc::new(ConsoleSink { format });

    let task_id = queue.enqueue(CLI_SENDER, &message).await?;
    if let OutputFormat::Text = format {
        println!("Executing task #{}: {}", task_id, message);
        println!();
    }

    queue
        .set_processor(Arc::new(AgentTaskProcessor::new(agent, sink)))
        .await?;
    queue.wait_until_idle().await;

    let task = queue
        .repository()
        .get_task(task_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Task #{} disappeared from the store", task_id))?;
    database.close().await?;

    match format {
        OutputFormat::Text => {
            println!();
            match task.status {
                TaskStatus::Done => println!("✓ Task #{} completed", task.id),
                _ => println!(
                    "✗ Task #{} {}: {}",
                    task.id,
                    task.status,
                    task.result.as_deref().unwrap_or("")
                ),
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
    }

    if task.status == TaskStatus::Failed {
        anyhow::bail!("Task #{} failed", task.id);
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() > max_chars {
        let cut: String = single_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        single_line
    }
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn print_task(task: &Task) {
    println!("Task #{} [{}]", task.id, task.status);
    println!("  Sender: {}", task.sender);
    println!("  Created: {}", format_timestamp(task.created_at));
    println!("  Message: {}", preview(&task.message, 80));
    if let Some(result) = &task.result {
        println!("  Result: {}", preview(result, 120));
    }
    println!();
}

/// Show task history
///
/// Lists the most recent tasks, newest first.
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.paths().db_path)
        .await
        .context("Failed to open database")?;

    let tasks = database
        .tasks()
        .recent_tasks(limit as i64)
        .await
        .context("Failed to fetch task history")?;

    match format {
        OutputFormat::Text => {
            if tasks.is_empty() {
                println!("No tasks in history");
            } else {
                println!("Task History (last {} tasks):", limit);
                println!();
                for task in &tasks {
                    print_task(task);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "tasks": tasks,
                "count": tasks.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await?;
    Ok(())
}

/// Show the effective execution settings
///
/// Creates the settings file with defaults when it does not exist yet.
pub async fn handle_settings(config: &Config, format: OutputFormat) -> Result<()> {
    let path = config.paths().settings_path;
    let settings = ExecutionSettings::load_or_create(&path);

    match format {
        OutputFormat::Text => {
            println!("Execution settings ({})", path.display());
            println!("  Max iterations:     {}", settings.max_iterations);
            println!("  Command timeout:    {}ms", settings.command_timeout_ms);
            println!("  Max output length:  {}", settings.max_output_length);
        }
        OutputFormat::Json => {
            let output = json!({
                "path": path,
                "settings": settings,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_secret() {
        assert_eq!(
            require_secret(Some("sk-1".to_string()), "OPENAI_API_KEY").unwrap(),
            "sk-1"
        );

        let err = require_secret(Some("  ".to_string()), "OPENAI_API_KEY").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::MissingSecret(name)) if name == "OPENAI_API_KEY"
        ));
        assert!(require_secret(None, "TELEGRAM_BOT_TOKEN").is_err());
    }

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("a\nb", 10), "a b");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("日本語テキスト", 3), "日本語...");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
    }

    #[tokio::test]
    async fn test_console_sink_ignores_other_senders() {
        let sink = ConsoleSink {
            format: OutputFormat::Json,
        };
        assert!(sink.send_text("12345", "hello").await.is_ok());
        assert!(sink.send_text(CLI_SENDER, "hello").await.is_ok());
        assert!(sink
            .send_file(CLI_SENDER, Path::new("/tmp/x.png"))
            .await
            .is_ok());
    }
}
