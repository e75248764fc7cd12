use super::{failure_text, Desktop, InvalidParams, ToolParams};
use sdk::types::CommandResult;
use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OpenUrlParams {
    url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenUrl {
    pub url: String,
}

impl ToolParams for OpenUrlParams {
    type Action = OpenUrl;

    fn describe(&self) -> String {
        format!("open_url: {}", self.url.as_deref().unwrap_or_default())
    }

    fn validate(self) -> Result<OpenUrl, InvalidParams> {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(OpenUrl {
                url: url.to_string(),
            }),
            _ => Err(InvalidParams::new(self.describe(), "URL is required")),
        }
    }
}

pub async fn run(desktop: &dyn Desktop, target: OpenUrl) -> CommandResult {
    let description = format!("open_url: {}", target.url);

    match desktop.open_url(&target.url).await {
        Ok(()) => {
            info!("{}", description);
            CommandResult::success(description, format!("Opened {}", target.url))
        }
        Err(e) => {
            error!(error = %e, "Open URL failed");
            CommandResult::failure(description, failure_text(&e))
        }
    }
}
