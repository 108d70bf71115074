//! Webhook event envelope — the inbound payload from the conversation platform.

use serde::Deserialize;

/// Event name the dispatcher reacts to. Everything else is acknowledged
/// and ignored.
pub const MESSAGE_CREATED: &str = "message_created";

/// Message direction markers used by Chatwoot.
pub const INCOMING: &str = "incoming";
pub const OUTGOING: &str = "outgoing";

/// Conversation reference inside a webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRef {
    pub id: i64,
}

/// Inbound webhook event. Only the fields the dispatcher needs are
/// modeled; the platform sends many more, which serde skips.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    pub conversation: Option<ConversationRef>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl WebhookEvent {
    /// Conversation id, if the payload carries one.
    pub fn conversation_id(&self) -> Option<i64> {
        self.conversation.as_ref().map(|c| c.id)
    }

    pub fn is_message_created(&self) -> bool {
        self.event == MESSAGE_CREATED
    }

    /// Client-originated message.
    pub fn is_incoming(&self) -> bool {
        self.message_type.as_deref() == Some(INCOMING)
    }

    /// Operator-originated message.
    pub fn is_outgoing(&self) -> bool {
        self.message_type.as_deref() == Some(OUTGOING)
    }

    /// Trimmed message text, or None when empty/absent.
    pub fn text(&self) -> Option<&str> {
        let text = self.content.as_deref()?.trim();
        if text.is_empty() { None } else { Some(text) }
    }
}
