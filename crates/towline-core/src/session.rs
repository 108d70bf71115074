//! Session state — per-conversation lifecycle the dispatcher reads and updates.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

/// Step a scenario is currently in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStep {
    /// Iterating the fixed question list.
    Questions,
    /// All questions answered; terminal behavior is scenario-specific.
    Complete,
}

/// State of the single active scenario in a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioState {
    pub name: String,
    pub step: ScenarioStep,
    /// Validated answers keyed by question key.
    pub answers: HashMap<String, String>,
    /// Index of the next unanswered question; equals the question count
    /// once all are answered.
    pub q_index: usize,
    /// Advisory completions consumed in the terminal step. Monotonic.
    pub free_completions_used: u32,
}

impl ScenarioState {
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            step: ScenarioStep::Questions,
            answers: HashMap::new(),
            q_index: 0,
            free_completions_used: 0,
        }
    }
}

/// Session state for a single conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Conversation history, append-only. Sliced to a window when passed
    /// to completion.
    pub history: Vec<ChatMessage>,
    /// Active scenario, if any. At most one per session.
    pub scenario: Option<ScenarioState>,
    /// Greeting sent once per conversation.
    pub greeted: bool,
    /// While true a human operator owns the conversation and the bot
    /// stays silent.
    pub handed_over: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: ChatMessage) {
        self.history.push(msg);
    }

    /// The most recent `n` history messages.
    pub fn recent(&self, n: usize) -> &[ChatMessage] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }
}

/// Keyed session storage. `get` never fails — absent conversations yield
/// a fresh session. Callers own read-modify-write correctness; the last
/// `set` wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, conversation_id: i64) -> Session;

    async fn set(&self, conversation_id: i64, session: Session);

    async fn clear(&self, conversation_id: i64);

    /// Number of tracked conversations.
    async fn count(&self) -> usize;
}

/// In-process store — the reference implementation for a single bot
/// instance. A distributed deployment would back this trait with an
/// external keyed store with the same get-or-default semantics.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<i64, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, conversation_id: i64) -> Session {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(&conversation_id).cloned().unwrap_or_default()
    }

    async fn set(&self, conversation_id: i64, session: Session) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(conversation_id, session);
    }

    async fn clear(&self, conversation_id: i64) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.remove(&conversation_id);
    }

    async fn count(&self) -> usize {
        let sessions = self.sessions.lock().unwrap();
        sessions.len()
    }
}
