//! Error types and handling
//!
//! This module provides the error types used throughout the Sidekick engine.
//! All errors implement the `EngineErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Hints are static strings. They never echo the wrapped message, so API keys,
//! bot tokens, and local paths carried by the inner error stay out of replies
//! sent back to a remote sender.

use thiserror::Error;

/// Trait for engine error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait EngineErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to relay over the messaging channel.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors affect a single task; the process keeps serving the
    /// queue. Non-recoverable errors require operator intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite operation failures
/// - **Queue**: Task queue contract violations
/// - **Planner**: Reasoning service failures
/// - **Transport**: Messaging channel failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, EngineErrorExt};
///
/// let error = EngineError::Planner("connection reset".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::ProcessorAlreadyRegistered;
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    #[error("Missing secret: {0}")]
    MissingSecret(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Queue errors
    #[error("A task processor is already registered")]
    ProcessorAlreadyRegistered,

    #[error("Task processor failed: {0}")]
    Processor(String),

    // Planner errors
    #[error("Planner error: {0}")]
    Planner(String),

    #[error("Planner call timed out")]
    PlannerTimeout,

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::PathCanonicalization(_, _) => "Invalid path specified",
            Self::MissingSecret(_) => "A required API key or token was not provided",

            // Database errors
            Self::Database(_) => "Task store operation failed. Try restarting Sidekick",

            // Queue errors
            Self::ProcessorAlreadyRegistered => "Only one task processor can be attached",
            Self::Processor(_) => "The task could not be completed",

            // Planner errors
            Self::Planner(_) => "The reasoning service is unavailable. Check your API key and network",
            Self::PlannerTimeout => "The reasoning service took too long to respond. Try again",

            // Transport errors
            Self::Transport(_) => "Could not reach the messaging service",
            Self::Transcription(_) => "The voice note could not be transcribed. Try sending text",

            // Network errors
            Self::Network(_) => "Network operation failed. Check your connection",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::ProcessorAlreadyRegistered | Self::MissingSecret(_) | Self::Config(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
