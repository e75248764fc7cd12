//! Agent Core
//!
//! This module implements the loop that turns one request into a reply.
//! Each request is processed through an iterative plan-act-observe cycle:
//!
//! 1. Build the conversation: system prompt, previous task context, request
//! 2. Ask the planner for the next decision
//! 3. Record the decision as an assistant turn
//! 4. Stop if the plan is final or asks for nothing
//! 5. Otherwise dispatch its single action and feed the result back
//!
//! # Limits
//!
//! - At most `maxIterations` planner decisions per request, plus one forced
//!   summary call when the budget runs out
//! - Each action is bounded by `commandTimeoutMs`
//!
//! Planner errors abort the run. Action failures never do; they come back as
//! observations for the planner to react to.

use anyhow::{Context, Result};
use sdk::types::CommandResult;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SettingsSource;
use crate::llm::Message;
use crate::tools::{ActionRunner, ToolKind};

use super::plan::Plan;
use super::planner::Planner;

/// Reply used when a final plan leaves `reply` empty.
pub const DEFAULT_REPLY: &str = "Done.";

/// Reply used when the forced summary after the last iteration is empty.
pub const MAX_ITERATIONS_REPLY: &str = "Done (max iterations reached).";

const SUMMARY_INSTRUCTION: &str = "Max iterations reached. Summarise everything you have so far into a final reply. Set \"done\": true.";

/// Final outcome of one agent run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    /// Text for the user
    pub reply: String,

    /// Files produced during the run, in first-seen order, without duplicates
    pub files: Vec<String>,
}

/// Agent loop that drives the planner and the action runner
pub struct AgentLoop {
    planner: Planner,
    runner: Arc<dyn ActionRunner>,
    settings: SettingsSource,
}

/// Accumulates produced file paths, keeping the first occurrence of each.
#[derive(Debug, Default)]
struct FileList(Vec<String>);

impl FileList {
    fn extend<I: IntoIterator<Item = String>>(&mut self, files: I) {
        for file in files {
            if !file.is_empty() && !self.0.contains(&file) {
                self.0.push(file);
            }
        }
    }
}

/// Render an action result as the observation the planner sees.
pub fn observation(result: &CommandResult) -> String {
    let status = if result.is_success() { '✓' } else { '✗' };
    format!("{} {}\n{}", status, result.command, result.output())
}

impl AgentLoop {
    pub fn new(planner: Planner, runner: Arc<dyn ActionRunner>, settings: SettingsSource) -> Self {
        Self {
            planner,
            runner,
            settings,
        }
    }

    /// Run the loop for one request.
    ///
    /// `previous_context` is the result of the last completed task, if any.
    pub async fn run(&self, message: &str, previous_context: Option<&str>) -> Result<AgentResponse> {
        let settings = self.settings.current();
        let max_iterations = settings.max_iterations;
        info!(max_iterations, "Running agent loop");

        let mut messages = vec![Message::system(self.planner.system_prompt())];
        if let Some(context) = previous_context.filter(|c| !c.trim().is_empty()) {
            messages.push(Message::user(format!("Previous task context:\n{}", context)));
        }
        messages.push(Message::user(message));

        let mut files = FileList::default();

        for iteration in 1..=max_iterations {
            debug!(iteration, max_iterations, "Agent iteration");

            let plan = self
                .planner
                .next(&messages)
                .await
                .with_context(|| format!("Planner call failed at iteration {}", iteration))?;

            files.extend(plan.files.iter().cloned());
            messages.push(Message::assistant(plan.to_turn()));

            if plan.is_terminal() {
                info!(iteration, "Agent finished");
                return Ok(finish(plan, files, DEFAULT_REPLY));
            }

            let result = self
                .runner
                .run(&plan.command, plan.tool.as_ref(), &settings)
                .await;

            if is_screenshot(&plan) && result.is_success() {
                files.extend([result.stdout.clone()]);
            }

            let observed = observation(&result);
            info!(
                iteration,
                exit_code = result.exit_code,
                command = %result.command,
                "Action completed"
            );
            messages.push(Message::user(format!("Command result:\n{}", observed)));
        }

        warn!(max_iterations, "Max iterations reached, forcing final summary");
        messages.push(Message::user(SUMMARY_INSTRUCTION));

        let plan = self
            .planner
            .next(&messages)
            .await
            .context("Planner call failed during final summary")?;
        files.extend(plan.files.iter().cloned());

        Ok(finish(plan, files, MAX_ITERATIONS_REPLY))
    }
}

fn is_screenshot(plan: &Plan) -> bool {
    plan.tool
        .as_ref()
        .is_some_and(|call| call.tool == ToolKind::Screenshot.as_str())
}

fn finish(plan: Plan, files: FileList, fallback: &str) -> AgentResponse {
    let reply = if plan.reply.trim().is_empty() {
        fallback.to_string()
    } else {
        plan.reply
    };

    AgentResponse {
        reply,
        files: files.0,
    }
}
