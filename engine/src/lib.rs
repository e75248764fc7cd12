//! Sidekick Engine Library
//!
//! This library provides the core functionality of Sidekick: a durable task
//! queue fed by a messaging channel, and an agent loop that carries each task
//! out on the local machine.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Shell command execution module
pub mod command_executor;

/// Database persistence module
pub mod db;

/// Durable single-worker task queue
pub mod queue;

/// Reasoning service client
pub mod llm;

/// Agent loop core module
pub mod agent;

/// Built-in desktop tools
pub mod tools;

/// Telegram bot module
pub mod bot;

/// Voice-note transcription
pub mod transcriber;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
