use super::{failure_text, Desktop, InvalidParams, ToolParams};
use sdk::types::CommandResult;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ScreenshotParams {
    filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    /// Requested file name, already reduced to its last path component
    pub filename: Option<String>,
}

impl ToolParams for ScreenshotParams {
    type Action = Screenshot;

    fn describe(&self) -> String {
        format!("screenshot: {}", self.filename.as_deref().unwrap_or_default())
    }

    fn validate(self) -> Result<Screenshot, InvalidParams> {
        let filename = self
            .filename
            .as_deref()
            .and_then(|name| Path::new(name.trim()).file_name())
            .map(|name| name.to_string_lossy().into_owned());
        Ok(Screenshot { filename })
    }
}

fn default_filename() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("screenshot-{}.png", millis)
}

/// Capture the display into `dir`. On success stdout is the absolute file path.
pub async fn run(desktop: &dyn Desktop, dir: &Path, shot: Screenshot) -> CommandResult {
    let filename = shot.filename.unwrap_or_else(default_filename);
    let description = format!("screenshot: {}", filename);
    let path: PathBuf = dir.join(&filename);

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        error!(dir = %dir.display(), error = %e, "Failed to create screenshots directory");
        return CommandResult::failure(description, e.to_string());
    }

    if let Err(e) = desktop.capture_screen(&path).await {
        error!(error = %e, "Screenshot failed");
        return CommandResult::failure(description, failure_text(&e));
    }

    if !path.exists() {
        return CommandResult::failure(description, "Screenshot file was not created");
    }

    info!(path = %path.display(), "Screenshot saved");
    CommandResult::success(description, path.display().to_string())
}
