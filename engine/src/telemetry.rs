//! Telemetry and Observability
//!
//! Handles setting up `tracing-subscriber` for structured logging.
//! Supports config-driven log levels, environment variable overrides,
//! and format switching between pretty (debug) and JSON (release).
//! Every event is also appended as a JSON line to `<data_dir>/logs/sidekick.log`.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "sidekick.log";

/// Logging setup for one process.
///
/// Constructed once in `main`. [`Telemetry::init`] installs the global
/// subscriber; calling it again is a no-op.
#[derive(Debug)]
pub struct Telemetry {
    log_file: PathBuf,
    initialized: AtomicBool,
}

impl Telemetry {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            log_file: logs_dir.join(LOG_FILE_NAME),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Install the subscriber with the given log level from config.
    ///
    /// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
    ///
    /// Returns `false` if this instance was already initialized.
    pub fn init(&self, log_level: &str) -> Result<bool> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        if let Some(parent) = self.log_file.parent() {
            std::fs::create_dir_all(parent).context("Failed to create log directory")?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .with_context(|| format!("Failed to open log file {}", self.log_file.display()))?;

        let default_filter = format!("{},sidekick_engine={}", log_level, log_level);
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

        // Console goes to stderr so command output on stdout stays clean
        let console = if cfg!(debug_assertions) {
            fmt::layer()
                .pretty()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed()
        } else {
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr)
                .boxed()
        };

        let file_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_ansi(false)
            .with_writer(Mutex::new(file));

        // Another subscriber may already be installed (tests, embedders)
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .with(file_layer)
            .try_init()
            .ok();

        Ok(true)
    }
}
