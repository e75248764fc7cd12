use super::{failure_text, Desktop, InvalidParams, PointerAction, ToolParams};
use sdk::types::CommandResult;
use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawAction {
    #[default]
    Click,
    Move,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MouseParams {
    x: Option<f64>,
    y: Option<f64>,
    #[serde(default)]
    action: RawAction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseClick {
    pub x: f64,
    pub y: f64,
    pub action: PointerAction,
}

impl MouseParams {
    fn action(&self) -> PointerAction {
        match self.action {
            RawAction::Click => PointerAction::Click,
            RawAction::Move => PointerAction::Move,
        }
    }
}

impl ToolParams for MouseParams {
    type Action = MouseClick;

    fn describe(&self) -> String {
        format!(
            "mouse_click: {} at ({}, {})",
            self.action().as_str(),
            self.x.unwrap_or_default(),
            self.y.unwrap_or_default()
        )
    }

    fn validate(self) -> Result<MouseClick, InvalidParams> {
        let action = self.action();
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok(MouseClick { x, y, action }),
            _ => Err(InvalidParams::new(
                self.describe(),
                "Numeric x and y coordinates are required",
            )),
        }
    }
}

impl MouseClick {
    fn describe(&self) -> String {
        format!("mouse_click: {} at ({}, {})", self.action.as_str(), self.x, self.y)
    }
}

pub async fn run(desktop: &dyn Desktop, click: MouseClick) -> CommandResult {
    let description = click.describe();

    match desktop.pointer(click.x, click.y, click.action).await {
        Ok(()) => {
            info!("{}", description);
            CommandResult::success(
                description,
                format!("Performed {} at ({}, {})", click.action.as_str(), click.x, click.y),
            )
        }
        Err(e) => {
            error!(error = %e, "Mouse action failed");
            CommandResult::failure(description, failure_text(&e))
        }
    }
}
