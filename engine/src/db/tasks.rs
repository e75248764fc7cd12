/// Task persistence operations
///
/// Every state transition the queue performs is a single SQL statement, so a
/// crash between two statements never leaves a half-applied transition.
/// All queries are parameterized.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Task status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            other => anyhow::bail!("Unknown task status '{}'", other),
        }
    }
}

/// Task record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub sender: String,
    pub message: String,
    pub status: TaskStatus,
    /// Result of the most recent `done` task at the moment this one started.
    /// Empty until the task is claimed, or when no task had completed yet.
    pub previous_context: String,
    pub result: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            sender: row.try_get("sender")?,
            message: row.try_get("message")?,
            status: status.parse()?,
            previous_context: row.try_get("previous_context")?,
            result: row.try_get("result")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Number of tasks in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub pending: i64,
    pub running: i64,
    pub done: i64,
    pub failed: i64,
}

const TASK_COLUMNS: &str =
    "id, sender, message, status, previous_context, result, created_at, updated_at";

fn now_secs() -> Result<i64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

/// Task repository for database operations
#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    /// Create a new task repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a new pending task and return it with its assigned id
    pub async fn create_task(&self, sender: &str, message: &str) -> Result<Task> {
        let now = now_secs()?;

        let result = sqlx::query(
            "INSERT INTO tasks (sender, message, status, previous_context, created_at, updated_at) \
             VALUES (?, ?, 'pending', '', ?, ?)",
        )
        .bind(sender)
        .bind(message)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create task")?;

        Ok(Task {
            id: result.last_insert_rowid(),
            sender: sender.to_string(),
            message: message.to_string(),
            status: TaskStatus::Pending,
            previous_context: String::new(),
            result: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Claim the oldest pending task
    ///
    /// Marks it `running` and stores the result of the most recently
    /// completed task as its context, all in one statement. Returns `None`
    /// when nothing is pending. Fails if another task is already running,
    /// since the schema allows only one.
    pub async fn claim_next(&self) -> Result<Option<Task>> {
        let now = now_secs()?;

        let row = sqlx::query(&format!(
            "UPDATE tasks SET status = 'running', \
                previous_context = COALESCE( \
                    (SELECT result FROM tasks WHERE status = 'done' ORDER BY id DESC LIMIT 1), ''), \
                updated_at = ? \
             WHERE id = (SELECT id FROM tasks WHERE status = 'pending' ORDER BY id ASC LIMIT 1) \
             RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim next task")?;

        row.as_ref().map(Task::from_row).transpose()
    }

    /// Mark a task as done with the processor's result
    pub async fn complete_task(&self, task_id: i64, result: &str) -> Result<()> {
        self.finish(task_id, TaskStatus::Done, result)
            .await
            .context("Failed to complete task")
    }

    /// Mark a task as failed, storing the error description as its result
    pub async fn fail_task(&self, task_id: i64, error: &str) -> Result<()> {
        self.finish(task_id, TaskStatus::Failed, error)
            .await
            .context("Failed to mark task as failed")
    }

    async fn finish(&self, task_id: i64, status: TaskStatus, result: &str) -> Result<()> {
        let now = now_secs()?;

        sqlx::query("UPDATE tasks SET status = ?, result = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(result)
            .bind(now)
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Reset every `running` task back to `pending`
    ///
    /// Only valid at startup, before any worker runs. Returns the number of
    /// tasks recovered.
    pub async fn reset_running(&self) -> Result<u64> {
        let now = now_secs()?;

        let result = sqlx::query(
            "UPDATE tasks SET status = 'pending', updated_at = ? WHERE status = 'running'",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to reset running tasks")?;

        Ok(result.rows_affected())
    }

    /// Get a task by ID
    pub async fn get_task(&self, task_id: i64) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch task")?;

        row.as_ref().map(Task::from_row).transpose()
    }

    /// Get recent tasks, newest first
    pub async fn recent_tasks(&self, limit: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks ORDER BY id DESC LIMIT ?",
            TASK_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent tasks")?;

        rows.iter().map(Task::from_row).collect()
    }

    /// Count tasks per status
    pub async fn count_by_status(&self) -> Result<TaskCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM tasks GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .context("Failed to count tasks")?;

        let mut counts = TaskCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            match status.parse()? {
                TaskStatus::Pending => counts.pending = n,
                TaskStatus::Running => counts.running = n,
                TaskStatus::Done => counts.done = n,
                TaskStatus::Failed => counts.failed = n,
            }
        }

        Ok(counts)
    }
}
