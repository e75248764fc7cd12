//! Durable task queue
//!
//! Tasks are persisted in SQLite and processed one at a time, oldest first,
//! by a single registered [`TaskProcessor`]. When a task starts, the result
//! of the most recently completed task is attached to it as context.
//!
//! # Drain state machine
//!
//! The queue is either `Idle` or `Draining`. `enqueue` and `set_processor`
//! start a drain only from `Idle`. The worker claims the next task and, when
//! none is pending, switches back to `Idle` while holding the same lock, so a
//! task enqueued at that moment is never left behind.
//!
//! # Crash recovery
//!
//! Constructing the queue resets tasks left `running` by a previous process
//! to `pending`; they are retried first because they are the oldest.

use async_trait::async_trait;
use sdk::errors::EngineError;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, info_span, warn, Instrument};

use crate::db::{Task, TaskCounts, TaskRepository};

/// Turns a task into the result text stored with it.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// Process one task. An `Err` marks the task `failed` with the error text.
    async fn process(&self, task: &Task) -> anyhow::Result<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("A task processor is already registered")]
    ProcessorAlreadyRegistered,

    #[error("Task store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<QueueError> for EngineError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::ProcessorAlreadyRegistered => EngineError::ProcessorAlreadyRegistered,
            QueueError::Store(e) => EngineError::Database(format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainState {
    Idle,
    Draining,
}

struct QueueState {
    processor: Option<Arc<dyn TaskProcessor>>,
    drain: DrainState,
}

struct Inner {
    repo: TaskRepository,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// Handle to the queue. Clones share the same worker and state.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    /// Open the queue over `repo`, recovering tasks interrupted by a crash.
    pub async fn new(repo: TaskRepository) -> Result<Self, QueueError> {
        let recovered = repo.reset_running().await?;
        if recovered > 0 {
            warn!(recovered, "Reset tasks left running by a previous process");
        }

        Ok(Self {
            inner: Arc::new(Inner {
                repo,
                state: Mutex::new(QueueState {
                    processor: None,
                    drain: DrainState::Idle,
                }),
                idle: Notify::new(),
            }),
        })
    }

    pub fn repository(&self) -> &TaskRepository {
        &self.inner.repo
    }

    /// Append a task and start draining if idle. Returns the task id.
    pub async fn enqueue(&self, sender: &str, message: &str) -> Result<i64, QueueError> {
        let task = self.inner.repo.create_task(sender, message).await?;
        info!(task_id = task.id, sender = %sender, "Task enqueued");

        self.kick().await;
        Ok(task.id)
    }

    /// Register the processor and start draining any backlog.
    pub async fn set_processor(&self, processor: Arc<dyn TaskProcessor>) -> Result<(), QueueError> {
        {
            let mut state = self.inner.state.lock().await;
            if state.processor.is_some() {
                return Err(QueueError::ProcessorAlreadyRegistered);
            }
            state.processor = Some(processor);
        }

        info!("Task processor registered");
        self.kick().await;
        Ok(())
    }

    pub async fn counts(&self) -> Result<TaskCounts, QueueError> {
        Ok(self.inner.repo.count_by_status().await?)
    }

    pub async fn is_idle(&self) -> bool {
        self.inner.state.lock().await.drain == DrainState::Idle
    }

    /// Resolve once no drain is in progress.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle().await {
                return;
            }
            notified.await;
        }
    }

    async fn kick(&self) {
        let mut state = self.inner.state.lock().await;
        if state.processor.is_none() || state.drain == DrainState::Draining {
            return;
        }
        state.drain = DrainState::Draining;
        drop(state);

        let queue = self.clone();
        tokio::spawn(async move { queue.drain().await });
    }

    async fn drain(&self) {
        loop {
            let (task, processor) = {
                let mut state = self.inner.state.lock().await;
                let claimed = match state.processor.clone() {
                    Some(processor) => match self.inner.repo.claim_next().await {
                        Ok(Some(task)) => Some((task, processor)),
                        Ok(None) => None,
                        Err(e) => {
                            error!(error = %format!("{:#}", e), "Failed to claim next task");
                            None
                        }
                    },
                    None => None,
                };

                match claimed {
                    Some(next) => next,
                    None => {
                        state.drain = DrainState::Idle;
                        self.inner.idle.notify_waiters();
                        return;
                    }
                }
            };

            let span = info_span!("task", task_id = task.id, sender = %task.sender);
            self.process(task, processor).instrument(span).await;
        }
    }

    async fn process(&self, task: Task, processor: Arc<dyn TaskProcessor>) {
        info!("Processing task");
        let task_id = task.id;

        // Run on its own tokio task so a panicking processor only fails this task
        let handle = tokio::spawn(
            async move { processor.process(&task).await }.instrument(tracing::Span::current()),
        );

        let outcome = match handle.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(join_error) if join_error.is_panic() => Err("Task processor panicked".to_string()),
            Err(_) => Err("Task processor was cancelled".to_string()),
        };

        let stored = match &outcome {
            Ok(result) => {
                info!("Task done");
                self.inner.repo.complete_task(task_id, result).await
            }
            Err(message) => {
                warn!(error = %message, "Task failed");
                self.inner.repo.fail_task(task_id, message).await
            }
        };

        if let Err(e) = stored {
            error!(error = %format!("{:#}", e), "Failed to record task outcome");
            // Leaving the row running would block every later claim
            if let Err(e) = self
                .inner
                .repo
                .fail_task(task_id, "Failed to record task outcome")
                .await
            {
                error!(error = %format!("{:#}", e), "Failed to mark task as failed");
            }
        }
    }
}
