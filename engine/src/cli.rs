//! CLI interface for Sidekick
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sidekick
///
/// Runs tasks on this computer on behalf of remote messages. Each task is
/// planned by a reasoning service and carried out one action at a time.
#[derive(Parser, Debug)]
#[command(name = "sidekick")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// API key for the reasoning service
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve tasks from Telegram until interrupted
    Start {
        /// Telegram bot token
        #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
        telegram_token: Option<String>,
    },

    /// Execute a task immediately and print the reply
    Run {
        /// The task to execute
        message: String,
    },

    /// Show task history
    History {
        /// Number of tasks to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the effective execution settings
    Settings,
}
