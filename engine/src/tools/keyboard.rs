use super::{failure_text, Desktop, InvalidParams, ToolParams};
use sdk::types::CommandResult;
use serde::Deserialize;
use tracing::{error, info};

/// Characters of typed text shown in the action description.
const DESCRIPTION_PREVIEW: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct KeyboardParams {
    text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardType {
    pub text: String,
}

fn describe(text: &str) -> String {
    let preview: String = text.chars().take(DESCRIPTION_PREVIEW).collect();
    format!("keyboard_type: \"{}\"", preview)
}

impl ToolParams for KeyboardParams {
    type Action = KeyboardType;

    fn describe(&self) -> String {
        describe(self.text.as_deref().unwrap_or_default())
    }

    fn validate(self) -> Result<KeyboardType, InvalidParams> {
        match self.text {
            Some(text) if !text.is_empty() => Ok(KeyboardType { text }),
            _ => Err(InvalidParams::new(self.describe(), "Text is required")),
        }
    }
}

pub async fn run(desktop: &dyn Desktop, typing: KeyboardType) -> CommandResult {
    let description = describe(&typing.text);

    match desktop.type_text(&typing.text).await {
        Ok(()) => {
            info!("{}", description);
            CommandResult::success(description, format!("Typed: \"{}\"", typing.text))
        }
        Err(e) => {
            error!(error = %e, "Keyboard action failed");
            CommandResult::failure(description, failure_text(&e))
        }
    }
}
