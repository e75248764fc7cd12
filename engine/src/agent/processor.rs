//! Glue between the task queue, the agent loop and the messaging channel.

use anyhow::Result;
use async_trait::async_trait;
use sdk::errors::{EngineError, EngineErrorExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::core::{AgentLoop, AgentResponse};
use crate::db::Task;
use crate::llm::LLMError;
use crate::queue::TaskProcessor;

/// Outbound side of the messaging channel.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()>;

    async fn send_file(&self, recipient: &str, path: &Path) -> Result<()>;
}

/// [`TaskProcessor`] that runs the agent loop and replies to the sender.
pub struct AgentTaskProcessor {
    agent: AgentLoop,
    sink: Arc<dyn ReplySink>,
}

impl AgentTaskProcessor {
    pub fn new(agent: AgentLoop, sink: Arc<dyn ReplySink>) -> Self {
        Self { agent, sink }
    }

    async fn deliver(&self, recipient: &str, response: &AgentResponse) {
        if let Err(e) = self.sink.send_text(recipient, &response.reply).await {
            warn!(error = %format!("{:#}", e), "Failed to send reply");
        }

        for file in &response.files {
            let path = Path::new(file);
            if !path.is_file() {
                warn!(file = %file, "Skipping missing output file");
                continue;
            }
            if let Err(e) = self.sink.send_file(recipient, path).await {
                warn!(file = %file, error = %format!("{:#}", e), "Failed to send file");
            }
        }
    }
}

/// The text stored as a task's result and offered to the next task as context.
pub fn result_text(response: &AgentResponse) -> String {
    if response.files.is_empty() {
        response.reply.clone()
    } else {
        format!("{}\nFiles: {}", response.reply, response.files.join(", "))
    }
}

/// User-safe hint for an error that escaped the agent loop.
pub fn failure_hint(error: &anyhow::Error) -> String {
    if let Some(llm) = error.downcast_ref::<LLMError>() {
        return EngineError::from(llm.clone()).user_hint().to_string();
    }
    if let Some(engine) = error.downcast_ref::<EngineError>() {
        return engine.user_hint().to_string();
    }
    EngineError::Processor(String::new()).user_hint().to_string()
}

#[async_trait]
impl TaskProcessor for AgentTaskProcessor {
    async fn process(&self, task: &Task) -> Result<String> {
        let context = Some(task.previous_context.as_str()).filter(|c| !c.is_empty());

        match self.agent.run(&task.message, context).await {
            Ok(response) => {
                info!(files = response.files.len(), "Agent run complete");
                self.deliver(&task.sender, &response).await;
                Ok(result_text(&response))
            }
            Err(e) => {
                let notice = format!("Sorry, task #{} failed. {}", task.id, failure_hint(&e));
                if let Err(send_err) = self.sink.send_text(&task.sender, &notice).await {
                    warn!(error = %format!("{:#}", send_err), "Failed to send failure notice");
                }
                Err(e)
            }
        }
    }
}
