use super::{failure_text, Desktop, InvalidParams, ToolParams};
use sdk::types::CommandResult;
use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OpenAppParams {
    app: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenApp {
    pub app: String,
}

impl ToolParams for OpenAppParams {
    type Action = OpenApp;

    fn describe(&self) -> String {
        format!("open_app: {}", self.app.as_deref().unwrap_or_default())
    }

    fn validate(self) -> Result<OpenApp, InvalidParams> {
        match self.app.as_deref().map(str::trim) {
            Some(app) if !app.is_empty() => Ok(OpenApp {
                app: app.to_string(),
            }),
            _ => Err(InvalidParams::new(self.describe(), "App name is required")),
        }
    }
}

pub async fn run(desktop: &dyn Desktop, target: OpenApp) -> CommandResult {
    let description = format!("open_app: {}", target.app);

    match desktop.open_app(&target.app).await {
        Ok(()) => {
            info!("{}", description);
            CommandResult::success(description, format!("Opened {}", target.app))
        }
        Err(e) => {
            error!(error = %e, "Open app failed");
            CommandResult::failure(description, failure_text(&e))
        }
    }
}
