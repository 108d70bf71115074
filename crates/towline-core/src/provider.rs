//! Completion backend trait — the abstraction over LLM completion APIs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::ChatMessage;

/// A single completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            model: None,
            max_tokens: 1024,
            temperature: 0.4,
        }
    }
}

/// Completion backend — implement this to add support for new model APIs.
///
/// The backend is a black box from messages to text. Timeouts are not its
/// concern; the gateway in `towline-hub` races it against a deadline.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name (e.g. "openai").
    fn name(&self) -> &str;

    /// Send a chat completion request and return the generated text.
    async fn chat(&self, request: ChatRequest) -> Result<String>;
}

/// Backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_base: None,
        }
    }
}
