//! Action dispatch
//!
//! The planner picks at most one action per turn: a raw shell command or a
//! named tool with a parameter map. [`ActionDispatcher`] turns that choice
//! into a [`CommandResult`]. It never returns an error; unknown tools, bad
//! parameters and platform failures all come back as results with a non-zero
//! exit code so the planner can see them and react.

pub mod desktop;
pub mod hints;
pub mod keyboard;
pub mod mouse;
pub mod open_app;
pub mod open_url;
pub mod screenshot;

pub use desktop::{Desktop, PointerAction, SystemDesktop};

use crate::command_executor::CommandExecutor;
use crate::config::ExecutionSettings;
use async_trait::async_trait;
use sdk::types::CommandResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// The closed set of action names the planner may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Shell,
    Screenshot,
    MouseClick,
    KeyboardType,
    OpenUrl,
    OpenApp,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::Shell,
        ToolKind::Screenshot,
        ToolKind::MouseClick,
        ToolKind::KeyboardType,
        ToolKind::OpenUrl,
        ToolKind::OpenApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Shell => "shell",
            ToolKind::Screenshot => "screenshot",
            ToolKind::MouseClick => "mouse_click",
            ToolKind::KeyboardType => "keyboard_type",
            ToolKind::OpenUrl => "open_url",
            ToolKind::OpenApp => "open_app",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown tool: {}", s))
    }
}

/// A tool choice as the planner wrote it: a name plus an untyped parameter map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, params: Value) -> Self {
        Self {
            tool: tool.into(),
            params: match params {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

/// Parameters rejected before any side effect ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidParams {
    /// Description of the attempted action, as reported in the result
    pub command: String,
    pub reason: String,
}

impl InvalidParams {
    pub fn new(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            reason: reason.into(),
        }
    }

    fn into_result(self) -> CommandResult {
        CommandResult::failure(self.command, self.reason)
    }
}

/// Raw, planner-supplied parameters for one tool.
///
/// Implementors deserialize leniently (every field optional) and then
/// [`validate`](ToolParams::validate) into a typed action.
pub(crate) trait ToolParams: DeserializeOwned + Default {
    type Action;

    /// Description used when the parameters are rejected
    fn describe(&self) -> String;

    fn validate(self) -> Result<Self::Action, InvalidParams>;
}

fn decode<P: ToolParams>(params: &Map<String, Value>) -> Result<P::Action, InvalidParams> {
    match serde_json::from_value::<P>(Value::Object(params.clone())) {
        Ok(raw) => raw.validate(),
        Err(e) => Err(InvalidParams::new(
            P::default().describe(),
            format!("Invalid parameters: {}", e),
        )),
    }
}

/// A validated action, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolAction {
    Shell(String),
    Screenshot(screenshot::Screenshot),
    MouseClick(mouse::MouseClick),
    KeyboardType(keyboard::KeyboardType),
    OpenUrl(open_url::OpenUrl),
    OpenApp(open_app::OpenApp),
}

impl ToolAction {
    /// Decode the planner's choice into a typed action.
    ///
    /// `command` is the plan's shell text; it is used when there is no tool or
    /// the tool is `shell`.
    pub fn from_plan(command: &str, tool: Option<&ToolCall>) -> Result<Self, InvalidParams> {
        let Some(call) = tool else {
            return Self::shell(command);
        };

        let kind: ToolKind = call
            .tool
            .parse()
            .map_err(|reason| InvalidParams::new(format!("unknown tool: {}", call.tool), reason))?;

        match kind {
            ToolKind::Shell => Self::shell(command),
            ToolKind::Screenshot => {
                decode::<screenshot::ScreenshotParams>(&call.params).map(ToolAction::Screenshot)
            }
            ToolKind::MouseClick => {
                decode::<mouse::MouseParams>(&call.params).map(ToolAction::MouseClick)
            }
            ToolKind::KeyboardType => {
                decode::<keyboard::KeyboardParams>(&call.params).map(ToolAction::KeyboardType)
            }
            ToolKind::OpenUrl => {
                decode::<open_url::OpenUrlParams>(&call.params).map(ToolAction::OpenUrl)
            }
            ToolKind::OpenApp => {
                decode::<open_app::OpenAppParams>(&call.params).map(ToolAction::OpenApp)
            }
        }
    }

    fn shell(command: &str) -> Result<Self, InvalidParams> {
        let command = command.trim();
        if command.is_empty() {
            return Err(InvalidParams::new("shell: ", "Command is required"));
        }
        Ok(ToolAction::Shell(command.to_string()))
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolAction::Shell(_) => ToolKind::Shell,
            ToolAction::Screenshot(_) => ToolKind::Screenshot,
            ToolAction::MouseClick(_) => ToolKind::MouseClick,
            ToolAction::KeyboardType(_) => ToolKind::KeyboardType,
            ToolAction::OpenUrl(_) => ToolKind::OpenUrl,
            ToolAction::OpenApp(_) => ToolKind::OpenApp,
        }
    }
}

/// Anything that can carry out one planned action.
///
/// The agent loop depends on this seam rather than on [`ActionDispatcher`]
/// directly, so tests can observe what would have run.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(
        &self,
        command: &str,
        tool: Option<&ToolCall>,
        settings: &ExecutionSettings,
    ) -> CommandResult;
}

/// Routes actions to the command executor or one of the named tools.
pub struct ActionDispatcher {
    executor: CommandExecutor,
    desktop: Arc<dyn Desktop>,
    screenshots_dir: PathBuf,
}

impl ActionDispatcher {
    pub fn new(
        executor: CommandExecutor,
        desktop: Arc<dyn Desktop>,
        screenshots_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            desktop,
            screenshots_dir: screenshots_dir.into(),
        }
    }

    pub async fn dispatch(&self, action: ToolAction, settings: &ExecutionSettings) -> CommandResult {
        let desktop = self.desktop.as_ref();
        match action {
            ToolAction::Shell(command) => self.executor.execute(&command, settings).await,
            ToolAction::Screenshot(shot) => screenshot::run(desktop, &self.screenshots_dir, shot).await,
            ToolAction::MouseClick(click) => mouse::run(desktop, click).await,
            ToolAction::KeyboardType(typing) => keyboard::run(desktop, typing).await,
            ToolAction::OpenUrl(url) => open_url::run(desktop, url).await,
            ToolAction::OpenApp(app) => open_app::run(desktop, app).await,
        }
    }
}

#[async_trait]
impl ActionRunner for ActionDispatcher {
    async fn run(
        &self,
        command: &str,
        tool: Option<&ToolCall>,
        settings: &ExecutionSettings,
    ) -> CommandResult {
        let action = match ToolAction::from_plan(command, tool) {
            Ok(action) => action,
            Err(invalid) => {
                debug!(command = %invalid.command, reason = %invalid.reason, "Rejected action");
                return invalid.into_result();
            }
        };

        if let Some(call) = tool {
            let params = Value::Object(call.params.clone());
            info!(tool = %action.kind(), params = %params, "Running tool");
        }

        self.dispatch(action, settings).await
    }
}

/// Turn a platform error into result text, adding a remediation hint if one applies.
pub(crate) fn failure_text(error: &anyhow::Error) -> String {
    hints::annotate(&format!("{:#}", error))
}
