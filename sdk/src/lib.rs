//! Sidekick SDK
//!
//! Shared types used by the engine and its tests: the engine error taxonomy
//! and the uniform command/tool outcome.

/// Error types and handling
pub mod errors;

/// Action outcome types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, EngineErrorExt};
pub use types::CommandResult;
