// Sidekick
// Main entry point for the sidekick binary

use clap::Parser;
use sidekick_engine::cli::{Cli, Command};
use sidekick_engine::config::Config;
use sidekick_engine::handlers::{
    handle_history, handle_run, handle_settings, handle_start, OutputFormat,
};
use sidekick_engine::telemetry::Telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(config.core.log_level.as_str());
    let telemetry = Telemetry::new(&config.paths().logs_dir);
    telemetry.init(log_level)?;

    tracing::info!("Sidekick v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Start { telegram_token } => {
            tracing::info!("Starting Telegram service...");
            handle_start(&config, cli.api_key, telegram_token).await
        }

        Command::Run { message } => {
            tracing::info!("Executing task: {}", message);
            handle_run(message, &config, cli.api_key, format).await
        }

        Command::History { limit } => {
            tracing::info!("Showing last {} tasks", limit);
            handle_history(limit, &config, format).await
        }

        Command::Settings => handle_settings(&config, format).await,
    }
}
