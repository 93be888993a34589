//! Error types and handling
//!
//! This module provides the error types used throughout the Triptych engine.
//! All errors implement the `TriptychErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry API keys or raw provider credentials. Provider
//! error text is scrubbed by the engine before it is wrapped here.

use thiserror::Error;

/// Trait for Triptych error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait TriptychErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// secrets or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried by re-running the command. Non-recoverable
    /// errors require a configuration change or manual intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite operation failures
/// - **LLM Provider**: API failures, missing credentials
/// - **Orchestration**: fatal agent calls, step ceiling, invalid run state
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, TriptychErrorExt};
///
/// let error = EngineError::StepLimitExceeded { limit: 25 };
/// println!("Hint: {}", error.user_hint());
/// assert!(!error.is_recoverable());
///
/// let transient = EngineError::AgentCallFailed {
///     agent: "critic".to_string(),
///     message: "timeout".to_string(),
/// };
/// assert!(transient.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Orchestration errors
    #[error("Agent '{agent}' call failed: {message}")]
    AgentCallFailed { agent: String, message: String },

    #[error("Step limit of {limit} graph steps exceeded")]
    StepLimitExceeded { limit: u32 },

    #[error("Invalid run state: {0}")]
    InvalidState(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Run {0} is not awaiting a user response")]
    NotAwaitingUser(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TriptychErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Check the data directory",
            Self::LLMProvider(_) => "LLM provider unavailable. Check your API keys and network",
            Self::MissingCredential(_) => {
                "Set DEEPSEEK_API_KEY or OPENAI_API_KEY, or store a key in the system keychain"
            }
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::AgentCallFailed { .. } => "A model call failed. Try again in a moment",
            Self::StepLimitExceeded { .. } => {
                "The run did not settle within the step limit. Check max_iterations and step_limit"
            }
            Self::InvalidState(_) => "The saved run is inconsistent. Start a new run",
            Self::RunNotFound(_) => "No run with that id. Use 'triptych history' to list runs",
            Self::NotAwaitingUser(_) => "This run is not waiting for an answer",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::MissingCredential(_)
            | Self::StepLimitExceeded { .. }
            | Self::InvalidState(_) => false,

            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_limit_is_fatal() {
        let err = EngineError::StepLimitExceeded { limit: 10 };
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn test_agent_call_failed_carries_agent() {
        let err = EngineError::AgentCallFailed {
            agent: "editor".to_string(),
            message: "rate limited".to_string(),
        };
        match &err {
            EngineError::AgentCallFailed { agent, message } => {
                assert_eq!(agent, "editor");
                assert_eq!(message, "rate limited");
            }
            _ => panic!("Expected AgentCallFailed"),
        }
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn test_hints_do_not_echo_details() {
        let err = EngineError::LLMProvider("sk-secret-value".to_string());
        assert!(!err.user_hint().contains("sk-secret-value"));
    }
}
