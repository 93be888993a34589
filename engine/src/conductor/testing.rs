//! Test doubles shared by the conductor unit tests

use crate::llm::{LLMError, LLMProvider, Message};
use async_trait::async_trait;
use std::sync::Mutex;

type Reply = Box<dyn Fn(&[Message]) -> Result<String, LLMError> + Send + Sync>;

/// Provider that answers through a closure and remembers every conversation
pub(crate) struct RecordingProvider {
    reply: Reply,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl RecordingProvider {
    pub(crate) fn new<F>(reply: F) -> Self
    where
        F: Fn(&[Message]) -> Result<String, LLMError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text
    pub(crate) fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Always fail
    pub(crate) fn failing() -> Self {
        Self::new(|_| Err(LLMError::NetworkError("connection reset".to_string())))
    }

    pub(crate) fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    /// Content of the last message of the most recent call
    pub(crate) fn last_request(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .and_then(|messages| messages.last())
            .map(|message| message.content.clone())
    }
}

#[async_trait]
impl LLMProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn generate(&self, messages: &[Message]) -> Result<String, LLMError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        (self.reply)(messages)
    }
}
