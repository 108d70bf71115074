//! Completion gateway — deadline and tone guard in front of the backend.
//!
//! Every call gets the fixed system instruction prepended and races a
//! timeout. No retries live here; on failure the dispatcher decides
//! whether to hand off to a human.

use std::sync::Arc;
use std::time::Duration;

use towline_core::error::{Result, TowlineError};
use towline_core::message::ChatMessage;
use towline_core::provider::{ChatRequest, CompletionBackend};

/// Language and tone constraints prepended to every completion call.
pub const SYSTEM_PROMPT: &str =
    "Ты ИИ ассистент поддержки. Отвечай ТОЛЬКО на русском языке, кратко и по делу.";

/// Gateway wrapping a completion backend with a fixed deadline.
pub struct CompletionGateway {
    backend: Arc<dyn CompletionBackend>,
    timeout: Duration,
}

impl CompletionGateway {
    pub fn new(backend: Arc<dyn CompletionBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Generate a reply for the given conversation turns.
    ///
    /// The losing future of the race is dropped, not actively canceled
    /// upstream; fire-and-forget on the loser side is acceptable.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut full = Vec::with_capacity(messages.len() + 1);
        full.push(ChatMessage::system(SYSTEM_PROMPT));
        full.extend_from_slice(messages);

        let request = ChatRequest {
            messages: full,
            ..Default::default()
        };

        match tokio::time::timeout(self.timeout, self.backend.chat(request)).await {
            Ok(result) => result,
            Err(_) => Err(TowlineError::CompletionTimeout(self.timeout.as_secs())),
        }
    }
}
