//! Execution settings
//!
//! Per-task limits consumed by the agent loop and the command executor,
//! stored as JSON at `<data_dir>/settings.json`:
//!
//! ```json
//! { "maxIterations": 10, "commandTimeoutMs": 30000, "maxOutputLength": 4000 }
//! ```
//!
//! Each field falls back to its default on its own when it is missing, not an
//! integer, or not positive. A broken file never prevents a task from running.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_OUTPUT_LENGTH: usize = 4_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSettings {
    pub max_iterations: u32,
    pub command_timeout_ms: u64,
    pub max_output_length: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            max_output_length: DEFAULT_MAX_OUTPUT_LENGTH,
        }
    }
}

impl ExecutionSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Build settings from an arbitrary JSON value, field by field.
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        let field = |name: &str| value.get(name).and_then(positive_integer);

        Self {
            max_iterations: field("maxIterations")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.max_iterations),
            command_timeout_ms: field("commandTimeoutMs").unwrap_or(defaults.command_timeout_ms),
            max_output_length: field("maxOutputLength")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.max_output_length),
        }
    }

    /// Load settings from `path`, creating the file with defaults if missing.
    ///
    /// Never fails: read or parse errors are logged and yield defaults.
    pub fn load_or_create(path: &Path) -> Self {
        if !path.exists() {
            let settings = Self::default();
            if let Err(e) = settings.save(path) {
                warn!(path = %path.display(), error = %e, "Failed to write default settings");
            } else {
                debug!(path = %path.display(), "Created default settings file");
            }
            return settings;
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read settings, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed settings file, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, json + "\n")
    }
}

fn positive_integer(value: &Value) -> Option<u64> {
    match value.as_u64() {
        Some(n) if n > 0 => Some(n),
        _ => None,
    }
}

/// Where the agent loop gets its settings from.
#[derive(Debug, Clone)]
pub enum SettingsSource {
    /// Fixed values, used by tests and embedders
    Fixed(ExecutionSettings),
    /// Re-read from disk at the start of every run
    File(PathBuf),
}

impl SettingsSource {
    pub fn current(&self) -> ExecutionSettings {
        match self {
            Self::Fixed(settings) => *settings,
            Self::File(path) => ExecutionSettings::load_or_create(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_fields_fall_back_independently() {
        let value = json!({
            "maxIterations": 3,
            "commandTimeoutMs": "soon",
            "maxOutputLength": -5
        });
        let settings = ExecutionSettings::from_value(&value);

        assert_eq!(settings.max_iterations, 3);
        assert_eq!(settings.command_timeout_ms, DEFAULT_COMMAND_TIMEOUT_MS);
        assert_eq!(settings.max_output_length, DEFAULT_MAX_OUTPUT_LENGTH);
    }

    #[test]
    fn test_zero_and_fractions_rejected() {
        let value = json!({ "maxIterations": 0, "commandTimeoutMs": 1.5 });
        assert_eq!(ExecutionSettings::from_value(&value), ExecutionSettings::default());
    }

    #[test]
    fn test_non_object_yields_defaults() {
        assert_eq!(
            ExecutionSettings::from_value(&json!([1, 2, 3])),
            ExecutionSettings::default()
        );
    }

    #[test]
    fn test_missing_file_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let settings = ExecutionSettings::load_or_create(&path);
        assert_eq!(settings, ExecutionSettings::default());
        assert!(path.exists());

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["maxIterations"], 10);
        assert_eq!(written["commandTimeoutMs"], 30000);
        assert_eq!(written["maxOutputLength"], 4000);
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(ExecutionSettings::load_or_create(&path), ExecutionSettings::default());
    }

    #[test]
    fn test_file_source_sees_edits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let source = SettingsSource::File(path.clone());

        assert_eq!(source.current().max_iterations, 10);
        fs::write(&path, r#"{"maxIterations": 2}"#).unwrap();
        assert_eq!(source.current().max_iterations, 2);
    }
}
