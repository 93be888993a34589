//! LLM Provider Abstraction Layer
//!
//! This module provides a common interface for the model backends the agents
//! talk to (any OpenAI-compatible endpoint, Ollama). The `LLMProvider` trait is
//! the only thing the orchestration core depends on: a provider takes a
//! conversation and returns the reply text, or fails with an `LLMError`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod ollama;
pub mod openai;
pub mod router;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "openai", "ollama")
    fn name(&self) -> &str;

    /// Returns true if this is a local provider (e.g., Ollama), false for cloud providers
    fn is_local(&self) -> bool;

    /// Generate a reply for the conversation
    ///
    /// # Arguments
    /// * `messages` - Full conversation history, oldest first
    ///
    /// # Returns
    /// * `Ok(String)` - The reply text
    /// * `Err(LLMError)` - If the request fails
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Decode a JSON model reply.
///
/// The whole reply is tried as JSON first, so backticks quoted inside string
/// values are left alone. Only when that fails is code-fence wrapping
/// stripped and the body decoded instead.
pub fn parse_json_reply<T: DeserializeOwned>(content: &str) -> serde_json::Result<T> {
    let trimmed = content.trim();

    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(raw_error) => {
            let body = strip_code_fences(trimmed);
            if body == trimmed {
                return Err(raw_error);
            }
            serde_json::from_str(body)
        }
    }
}

/// Strip markdown code-fence wrapping from a model reply.
///
/// Handles a reply that is entirely one fenced block (with or without a
/// language tag) and a fenced block surrounded by prose. Text without fences
/// is returned trimmed.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip the language tag line (e.g. "json\n")
        let body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
        let body = body.trim_end();
        let body = body.strip_suffix("```").unwrap_or(body);
        return body.trim();
    }

    extract_fenced_block(trimmed).map(str::trim).unwrap_or(trimmed)
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is prose before the opening or after the closing ```.
fn extract_fenced_block(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let assistant_msg = Message::assistant("Hi there");
        assert_eq!(assistant_msg.role, MessageRole::Assistant);

        let system_msg = Message::system("You are a careful editor");
        assert_eq!(system_msg.role, MessageRole::System);
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::user("test");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"user""#));
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn test_strip_plain_text() {
        assert_eq!(strip_code_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_json_fence() {
        let reply = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_bare_fence() {
        let reply = "```\n{\"a\": 1}\n```\n";
        assert_eq!(strip_code_fences(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_fence_inside_prose() {
        let reply = "Here is my verdict:\n```json\n{\"a\": 1}\n```\nThanks.";
        assert_eq!(strip_code_fences(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_reply_keeps_backticks_inside_strings() {
        let reply = "{\"note\": \"run ```cargo test``` first\"}";
        let value: serde_json::Value = parse_json_reply(reply).unwrap();
        assert_eq!(value["note"], "run ```cargo test``` first");
    }

    #[test]
    fn test_parse_reply_falls_back_to_fence() {
        let reply = "Verdict below.\n```json\n{\"a\": 1}\n```";
        let value: serde_json::Value = parse_json_reply(reply).unwrap();
        assert_eq!(value["a"], 1);
        assert!(parse_json_reply::<serde_json::Value>("no json here").is_err());
    }

    #[test]
    fn test_strip_unclosed_fence() {
        let reply = "```json\n{\"a\": 1}";
        assert_eq!(strip_code_fences(reply), "{\"a\": 1}");
    }
}
