//! Planner client
//!
//! Wraps an [`LLMProvider`] with the system prompt and plan decoding. Calls
//! are never retried here; a failure aborts the current task.

use super::plan::{decode_plan, Plan, PlanDecode};
use crate::llm::{LLMError, LLMProvider, Message};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Planner {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    timeout: Duration,
}

impl Planner {
    pub fn new(provider: Arc<dyn LLMProvider>, workspace: &Path, timeout: Duration) -> Self {
        Self {
            provider,
            system_prompt: build_system_prompt(workspace),
            timeout,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Ask for the next decision given the conversation so far.
    pub async fn next(&self, messages: &[Message]) -> Result<Plan, LLMError> {
        debug!(
            provider = self.provider.name(),
            turns = messages.len(),
            "Calling planner"
        );

        let raw = tokio::time::timeout(self.timeout, self.provider.complete(messages))
            .await
            .map_err(|_| LLMError::Timeout)??;

        debug!(raw = %raw, "Planner raw response");

        match decode_plan(&raw) {
            PlanDecode::Structured(plan) => {
                info!(reasoning = %plan.reasoning, done = plan.done, "Planner decision");
                Ok(plan)
            }
            PlanDecode::PlainText(plan) => {
                warn!("Planner reply was not a JSON object, treating it as the final answer");
                Ok(plan)
            }
        }
    }
}

fn shell_name() -> &'static str {
    if cfg!(windows) {
        "cmd.exe"
    } else {
        "/bin/bash"
    }
}

pub fn build_system_prompt(workspace: &Path) -> String {
    let home = dirs::home_dir()
        .map(|h| h.display().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        r#"You are Sidekick, an assistant that operates a computer on the user's behalf.

Environment:
- OS: {os} ({arch})
- Shell: {shell}
- Home directory: {home}
- Working directory: {workspace}

Work step by step. On every turn return ONE JSON object with exactly this shape:

{{
  "command": "shell command to run, or empty",
  "tool": null,
  "reasoning": "why this step",
  "reply": "",
  "files": [],
  "done": false
}}

Instead of a shell command you may set "tool" to one of:
- {{"tool": "screenshot", "params": {{"filename": "optional.png"}}}}: capture the screen; the file is sent to the user automatically
- {{"tool": "mouse_click", "params": {{"x": 100, "y": 200, "action": "click"}}}}: action is "click" or "move"
- {{"tool": "keyboard_type", "params": {{"text": "hello"}}}}: type text into the focused window
- {{"tool": "open_url", "params": {{"url": "https://example.com"}}}}: open a URL in the default browser
- {{"tool": "open_app", "params": {{"app": "Safari"}}}}: launch an application by name
- {{"tool": "shell", "params": {{}}}}: same as leaving "tool" null; runs "command"

After each action you receive its result as the next message, starting with ✓ on success or ✗ on failure.

Rules:
- Exactly one action per response. Never put several commands in one turn unless they are a single shell pipeline.
- Commands run in {shell} from the working directory. Use absolute paths or cd explicitly.
- Prefer read-only commands unless the user explicitly asks to change something.
- Never use sudo unless explicitly requested.
- You are a task executor, not a chatbot. For greetings or casual chat reply briefly, set "done": true, and ask nothing back.
- List any files you produced that the user should receive in "files" as absolute paths.
- When the task is complete set "done": true and put the final answer for the user in "reply". Leave "reply" empty while you still need to act."#,
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        shell = shell_name(),
        home = home,
        workspace = workspace.display(),
    )
}
