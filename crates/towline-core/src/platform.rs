//! Platform trait — abstraction over the conversation platform's REST API.

use async_trait::async_trait;

use crate::error::Result;

/// Outbound side effects on the conversation platform.
///
/// Implementations: the Chatwoot client in `towline-hub`, and a recording
/// double for tests.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Post a message visible to the client.
    async fn send_message(&self, conversation_id: i64, content: &str) -> Result<()>;

    /// Post a private/internal note. Best-effort: implementations log and
    /// swallow upstream failures, so this never interrupts a turn.
    async fn add_private_note(&self, conversation_id: i64, content: &str) -> Result<()>;

    /// Assign the conversation to the configured operator. A no-op when
    /// no operator identity is configured.
    async fn assign_operator(&self, conversation_id: i64) -> Result<()>;
}
