//! Test doubles shared across the hub's unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use towline_core::error::{Result, TowlineError};
use towline_core::platform::Platform;
use towline_core::provider::{ChatRequest, CompletionBackend};

/// Platform double that records every side effect.
#[derive(Default)]
pub struct RecordingPlatform {
    pub messages: Mutex<Vec<(i64, String)>>,
    pub notes: Mutex<Vec<(i64, String)>>,
    pub assignments: Mutex<Vec<i64>>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible messages sent to one conversation, in order.
    pub fn messages_for(&self, conversation_id: i64) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == conversation_id)
            .map(|(_, content)| content.clone())
            .collect()
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn send_message(&self, conversation_id: i64, content: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((conversation_id, content.to_string()));
        Ok(())
    }

    async fn add_private_note(&self, conversation_id: i64, content: &str) -> Result<()> {
        self.notes
            .lock()
            .unwrap()
            .push((conversation_id, content.to_string()));
        Ok(())
    }

    async fn assign_operator(&self, conversation_id: i64) -> Result<()> {
        self.assignments.lock().unwrap().push(conversation_id);
        Ok(())
    }
}

enum StubMode {
    Reply(String),
    Fail,
    Hang,
}

/// Completion backend double: canned reply, upstream failure, or a call
/// that never resolves (for timeout tests under a paused clock).
pub struct StubBackend {
    mode: StubMode,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl StubBackend {
    pub fn replying(reply: &str) -> Self {
        Self {
            mode: StubMode::Reply(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            mode: StubMode::Fail,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn hanging() -> Self {
        Self {
            mode: StubMode::Hang,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        match &self.mode {
            StubMode::Reply(reply) => Ok(reply.clone()),
            StubMode::Fail => Err(TowlineError::CompletionUpstream("stub failure".into())),
            StubMode::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
