//! Conversation dispatcher — the per-event decision pipeline.
//!
//! Stages run in strict priority order, first claim wins: operator
//! bookkeeping → handoff silence → greeting → keyword rules → operator
//! intent → scenario registry → retrieval/completion. The session is
//! persisted back to the store before returning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use towline_core::error::Result;
use towline_core::event::WebhookEvent;
use towline_core::message::ChatMessage;
use towline_core::platform::Platform;
use towline_core::session::{Session, SessionStore};
use towline_core::text::{normalize, wants_operator};

use crate::gateway::CompletionGateway;
use crate::metrics::{HandoffReason, SharedMetrics};
use crate::retrieval::{KnowledgeBase, ScoredSnippet};
use crate::scenarios::{Outcome, ScenarioHandler, TurnContext, default_registry};

pub const GREETING: &str = "Здравствуйте! Чем могу помочь?";
pub const HANDOFF_NOTICE: &str = "Передаю диалог оператору. Пожалуйста, подождите.";
pub const RESUME_NOTICE: &str = "Похоже, оператор пока не подключился. Я продолжу помогать вам.";

const NOTE_MANUAL_HANDOFF: &str = "🧑‍💼 Диалог передан оператору по запросу клиента";
const NOTE_TIMEOUT_HANDOFF: &str = "⏱ Ассистент не ответил — диалог передан оператору";
const NOTE_NO_CONTEXT_HANDOFF: &str = "📭 В базе знаний нет ответа — диалог передан оператору";
const NOTE_COMPLETION_REPLY: &str = "🧠 Ассистент ответил пользователю";
const NOTE_FALLBACK: &str = "🔁 Оператор не ответил — бот продолжил диалог";

/// History window passed to completion in plain mode.
const PLAIN_HISTORY_WINDOW: usize = 10;
/// Tighter window when retrieved context takes part of the budget.
const RETRIEVAL_HISTORY_WINDOW: usize = 6;

/// A canned-answer rule matched by substring against normalized text.
pub struct KeywordRule {
    pub keywords: Vec<String>,
    pub reply: String,
}

impl KeywordRule {
    fn matches(&self, normalized: &str) -> bool {
        self.keywords.iter().any(|kw| normalized.contains(kw.as_str()))
    }
}

/// Built-in rules: the business-hours question.
pub fn default_rules() -> Vec<KeywordRule> {
    vec![KeywordRule {
        keywords: vec![
            "часы работы".to_string(),
            "режим работы".to_string(),
            "график работы".to_string(),
        ],
        reply: "Мы работаем ежедневно с 9:00 до 18:00 по Москве.".to_string(),
    }]
}

/// Pending operator-fallback timers, one at most per conversation.
pub struct FallbackTimers {
    handles: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl FallbackTimers {
    fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Abort and forget a pending timer, if any.
    fn cancel(&self, conversation_id: i64) {
        if let Some(handle) = self.handles.lock().unwrap().remove(&conversation_id) {
            handle.abort();
        }
    }

    /// Drop the entry without aborting — used by a timer removing itself.
    fn remove(&self, conversation_id: i64) {
        self.handles.lock().unwrap().remove(&conversation_id);
    }

    fn pending(&self) -> usize {
        self.handles.lock().unwrap().len()
    }
}

/// The orchestrator: loads the session, runs the decision pipeline,
/// performs side effects, and persists the session back.
pub struct Dispatcher {
    store: Arc<dyn SessionStore>,
    platform: Arc<dyn Platform>,
    gateway: Arc<CompletionGateway>,
    knowledge: Option<Arc<KnowledgeBase>>,
    scenarios: Vec<Arc<dyn ScenarioHandler>>,
    rules: Vec<KeywordRule>,
    timers: Arc<FallbackTimers>,
    metrics: SharedMetrics,
    fallback_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SessionStore>,
        platform: Arc<dyn Platform>,
        gateway: Arc<CompletionGateway>,
        metrics: SharedMetrics,
        fallback_timeout: Duration,
    ) -> Self {
        Self {
            store,
            platform,
            gateway,
            knowledge: None,
            scenarios: default_registry(),
            rules: default_rules(),
            timers: Arc::new(FallbackTimers::new()),
            metrics,
            fallback_timeout,
        }
    }

    /// Enable retrieval-grounded replies.
    pub fn with_knowledge(mut self, knowledge: Arc<KnowledgeBase>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_scenarios(mut self, scenarios: Vec<Arc<dyn ScenarioHandler>>) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn with_rules(mut self, rules: Vec<KeywordRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Pending fallback timers (observability).
    pub fn pending_fallbacks(&self) -> usize {
        self.timers.pending()
    }

    /// Process one webhook event. Ignored and malformed events return Ok;
    /// a returned error means the top-level handler answers 500.
    pub async fn handle_event(&self, event: &WebhookEvent) -> Result<()> {
        if !event.is_message_created() {
            return Ok(());
        }
        let Some(conversation_id) = event.conversation_id() else {
            return Ok(());
        };

        // Operator wrote — they own the conversation again; stand down.
        if event.is_outgoing() {
            self.timers.cancel(conversation_id);
            let mut session = self.store.get(conversation_id).await;
            if session.handed_over {
                session.handed_over = false;
                self.store.set(conversation_id, session).await;
                info!("Operator engaged on conversation {}", conversation_id);
            }
            return Ok(());
        }

        if !event.is_incoming() {
            return Ok(());
        }
        let Some(text) = event.text() else {
            return Ok(());
        };

        self.metrics.record_incoming();
        let mut session = self.store.get(conversation_id).await;

        // A human owns the conversation; the bot is silent.
        if session.handed_over {
            return Ok(());
        }

        // Greeting consumes the whole first turn.
        if !session.greeted {
            session.greeted = true;
            self.metrics.record_greeting();
            self.platform.send_message(conversation_id, GREETING).await?;
            self.store.set(conversation_id, session).await;
            return Ok(());
        }

        let normalized = normalize(text);
        if let Some(rule) = self.rules.iter().find(|r| r.matches(&normalized)) {
            self.platform.send_message(conversation_id, &rule.reply).await?;
            self.store.set(conversation_id, session).await;
            return Ok(());
        }

        if wants_operator(text) {
            self.hand_over(
                conversation_id,
                &mut session,
                HandoffReason::Manual,
                NOTE_MANUAL_HANDOFF,
                true,
            )
            .await?;
            self.store.set(conversation_id, session).await;
            return Ok(());
        }

        let ctx = TurnContext {
            conversation_id,
            platform: self.platform.as_ref(),
            gateway: self.gateway.as_ref(),
        };
        for scenario in &self.scenarios {
            if let Outcome::Claimed = scenario.try_handle(text, &ctx, &mut session).await? {
                self.store.set(conversation_id, session).await;
                return Ok(());
            }
        }

        self.complete_turn(conversation_id, text, &mut session).await?;
        self.store.set(conversation_id, session).await;
        Ok(())
    }

    /// Final pipeline stage: retrieval-grounded or plain completion.
    async fn complete_turn(
        &self,
        conversation_id: i64,
        text: &str,
        session: &mut Session,
    ) -> Result<()> {
        session.push(ChatMessage::user(text));

        let messages: Vec<ChatMessage> = match &self.knowledge {
            Some(knowledge) => {
                let snippets = knowledge.retrieve(text);
                if snippets.is_empty() {
                    // No coverage — hand off instead of answering ungrounded.
                    self.hand_over(
                        conversation_id,
                        session,
                        HandoffReason::NoContext,
                        NOTE_NO_CONTEXT_HANDOFF,
                        true,
                    )
                    .await?;
                    return Ok(());
                }
                let mut messages = vec![ChatMessage::system(&grounding_context(&snippets))];
                messages.extend_from_slice(session.recent(RETRIEVAL_HISTORY_WINDOW));
                messages
            }
            None => session.recent(PLAIN_HISTORY_WINDOW).to_vec(),
        };

        let answer = match self.gateway.complete(&messages).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Completion failed for conversation {}: {}", conversation_id, e);
                // The user never sees an error; the conversation quietly
                // moves to a human.
                self.hand_over(
                    conversation_id,
                    session,
                    HandoffReason::Timeout,
                    NOTE_TIMEOUT_HANDOFF,
                    false,
                )
                .await?;
                return Ok(());
            }
        };

        session.push(ChatMessage::assistant(&answer));
        self.metrics.record_completion_reply();
        self.platform
            .add_private_note(conversation_id, NOTE_COMPLETION_REPLY)
            .await?;
        self.platform.send_message(conversation_id, &answer).await?;
        Ok(())
    }

    /// Transfer the conversation to a human: flag, note, optional user
    /// notice, assignment, fallback timer.
    async fn hand_over(
        &self,
        conversation_id: i64,
        session: &mut Session,
        reason: HandoffReason,
        note: &str,
        notify_user: bool,
    ) -> Result<()> {
        session.handed_over = true;
        self.metrics.record_handoff(reason);
        self.platform.add_private_note(conversation_id, note).await?;
        if notify_user {
            self.platform.send_message(conversation_id, HANDOFF_NOTICE).await?;
        }
        self.platform.assign_operator(conversation_id).await?;
        self.schedule_fallback(conversation_id);
        Ok(())
    }

    /// Arm the operator-fallback timer. A no-op while one is pending.
    fn schedule_fallback(&self, conversation_id: i64) {
        let mut handles = self.timers.handles.lock().unwrap();
        if handles.contains_key(&conversation_id) {
            return;
        }

        let store = Arc::clone(&self.store);
        let platform = Arc::clone(&self.platform);
        let timers = Arc::clone(&self.timers);
        let metrics = Arc::clone(&self.metrics);
        let deadline = self.fallback_timeout;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            timers.remove(conversation_id);

            let mut session = store.get(conversation_id).await;
            if !session.handed_over {
                return;
            }
            session.handed_over = false;
            store.set(conversation_id, session).await;
            metrics.record_fallback();

            let _ = platform.add_private_note(conversation_id, NOTE_FALLBACK).await;
            if let Err(e) = platform.send_message(conversation_id, RESUME_NOTICE).await {
                error!("Fallback resume notice failed for {}: {}", conversation_id, e);
            }
        });
        handles.insert(conversation_id, handle);
    }
}

/// System message grounding the completion in retrieved snippets.
fn grounding_context(snippets: &[ScoredSnippet]) -> String {
    let mut context =
        String::from("Отвечай, используя только эти сведения из базы знаний:\n");
    for snippet in snippets {
        context.push_str("\n— ");
        context.push_str(&snippet.text);
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Snippet;
    use crate::testing::{RecordingPlatform, StubBackend};
    use std::sync::atomic::Ordering;
    use towline_core::session::InMemorySessionStore;

    const FALLBACK: Duration = Duration::from_secs(180);

    struct Fixture {
        dispatcher: Dispatcher,
        platform: Arc<RecordingPlatform>,
        backend: Arc<StubBackend>,
        store: Arc<InMemorySessionStore>,
        metrics: SharedMetrics,
    }

    fn fixture(backend: StubBackend) -> Fixture {
        let platform = Arc::new(RecordingPlatform::new());
        let backend = Arc::new(backend);
        let store = Arc::new(InMemorySessionStore::new());
        let metrics = crate::metrics::new_metrics();
        let gateway = Arc::new(CompletionGateway::new(
            backend.clone(),
            Duration::from_secs(15),
        ));
        let dispatcher = Dispatcher::new(
            store.clone(),
            platform.clone(),
            gateway,
            metrics.clone(),
            FALLBACK,
        );
        Fixture {
            dispatcher,
            platform,
            backend,
            store,
            metrics,
        }
    }

    fn incoming(conversation_id: i64, content: &str) -> WebhookEvent {
        serde_json::from_value(serde_json::json!({
            "event": "message_created",
            "conversation": { "id": conversation_id },
            "message_type": "incoming",
            "content": content,
        }))
        .unwrap()
    }

    fn outgoing(conversation_id: i64) -> WebhookEvent {
        serde_json::from_value(serde_json::json!({
            "event": "message_created",
            "conversation": { "id": conversation_id },
            "message_type": "outgoing",
            "content": "оператор на связи",
        }))
        .unwrap()
    }

    /// Greet conversation 1 so later turns exercise the rest of the pipeline.
    async fn greet(f: &Fixture) {
        f.dispatcher.handle_event(&incoming(1, "привет")).await.unwrap();
    }

    #[tokio::test]
    async fn first_message_gets_exactly_the_greeting() {
        let f = fixture(StubBackend::replying("ответ"));

        // Even a scenario trigger is consumed by the greeting turn.
        f.dispatcher.handle_event(&incoming(1, "дтп")).await.unwrap();

        assert_eq!(f.platform.messages_for(1), vec![GREETING.to_string()]);
        assert_eq!(f.backend.call_count(), 0);
        let session = f.store.get(1).await;
        assert!(session.greeted);
        assert!(session.scenario.is_none());
    }

    #[tokio::test]
    async fn ignored_and_malformed_events_do_nothing() {
        let f = fixture(StubBackend::replying("ответ"));

        let other: WebhookEvent =
            serde_json::from_value(serde_json::json!({ "event": "conversation_updated" })).unwrap();
        f.dispatcher.handle_event(&other).await.unwrap();

        let no_conversation: WebhookEvent = serde_json::from_value(serde_json::json!({
            "event": "message_created", "message_type": "incoming", "content": "hi",
        }))
        .unwrap();
        f.dispatcher.handle_event(&no_conversation).await.unwrap();

        f.dispatcher.handle_event(&incoming(1, "   ")).await.unwrap();

        assert_eq!(f.platform.message_count(), 0);
        assert_eq!(f.metrics.total_incoming.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn keyword_rule_short_circuits_before_completion() {
        let f = fixture(StubBackend::replying("ответ"));
        greet(&f).await;

        f.dispatcher
            .handle_event(&incoming(1, "Какие у вас часы работы?"))
            .await
            .unwrap();

        let sent = f.platform.messages_for(1);
        assert!(sent[1].contains("с 9:00 до 18:00"));
        assert_eq!(f.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn operator_request_hands_over_and_arms_timer() {
        let f = fixture(StubBackend::replying("ответ"));
        greet(&f).await;

        f.dispatcher
            .handle_event(&incoming(1, "соедините с оператором"))
            .await
            .unwrap();

        let session = f.store.get(1).await;
        assert!(session.handed_over);
        assert_eq!(f.dispatcher.pending_fallbacks(), 1);
        assert_eq!(*f.platform.assignments.lock().unwrap(), vec![1]);
        assert_eq!(f.platform.messages_for(1)[1], HANDOFF_NOTICE);
        assert_eq!(f.metrics.handoffs_manual.load(Ordering::Relaxed), 1);

        // While handed over the bot is silent.
        f.dispatcher.handle_event(&incoming(1, "ау?")).await.unwrap();
        assert_eq!(f.platform.messages_for(1).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_timer_resumes_the_bot() {
        let f = fixture(StubBackend::replying("ответ"));
        greet(&f).await;
        f.dispatcher
            .handle_event(&incoming(1, "нужен оператор"))
            .await
            .unwrap();

        tokio::time::sleep(FALLBACK + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        let session = f.store.get(1).await;
        assert!(!session.handed_over);
        assert_eq!(f.dispatcher.pending_fallbacks(), 0);
        assert_eq!(f.platform.messages_for(1).last().unwrap(), RESUME_NOTICE);
        assert_eq!(f.metrics.fallbacks.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn operator_reply_cancels_timer_before_it_fires() {
        let f = fixture(StubBackend::replying("ответ"));
        greet(&f).await;
        f.dispatcher
            .handle_event(&incoming(1, "нужен оператор"))
            .await
            .unwrap();
        assert_eq!(f.dispatcher.pending_fallbacks(), 1);

        f.dispatcher.handle_event(&outgoing(1)).await.unwrap();
        assert_eq!(f.dispatcher.pending_fallbacks(), 0);
        assert!(!f.store.get(1).await.handed_over);

        let before = f.platform.message_count();
        tokio::time::sleep(FALLBACK * 2).await;
        tokio::task::yield_now().await;

        // The canceled timer never fires.
        assert_eq!(f.platform.message_count(), before);
        assert_eq!(f.metrics.fallbacks.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_timeout_hands_over_silently() {
        let f = fixture(StubBackend::hanging());
        greet(&f).await;

        f.dispatcher
            .handle_event(&incoming(1, "посоветуй что-нибудь"))
            .await
            .unwrap();

        let session = f.store.get(1).await;
        assert!(session.handed_over);
        assert_eq!(f.dispatcher.pending_fallbacks(), 1);
        // No user-visible error text: only the greeting went out.
        assert_eq!(f.platform.messages_for(1), vec![GREETING.to_string()]);
        assert_eq!(f.metrics.handoffs_timeout.load(Ordering::Relaxed), 1);
        assert_eq!(*f.platform.assignments.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn upstream_failure_follows_the_timeout_path() {
        let f = fixture(StubBackend::failing());
        greet(&f).await;

        f.dispatcher.handle_event(&incoming(1, "вопрос")).await.unwrap();

        assert!(f.store.get(1).await.handed_over);
        assert_eq!(f.metrics.handoffs_timeout.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn plain_completion_appends_history_and_replies() {
        let f = fixture(StubBackend::replying("вот ответ"));
        greet(&f).await;

        f.dispatcher
            .handle_event(&incoming(1, "расскажи про тарифы"))
            .await
            .unwrap();

        let session = f.store.get(1).await;
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[0].content, "расскажи про тарифы");
        assert_eq!(session.history[1].content, "вот ответ");
        assert_eq!(f.platform.messages_for(1).last().unwrap(), "вот ответ");
        assert_eq!(f.metrics.completion_replies.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn scenario_claims_the_turn_after_greeting() {
        let f = fixture(StubBackend::replying("ответ"));
        greet(&f).await;

        f.dispatcher.handle_event(&incoming(1, "у нас дтп")).await.unwrap();

        let session = f.store.get(1).await;
        assert_eq!(session.scenario.as_ref().unwrap().name, "accident");
        // Intro + first question, and no completion call.
        assert_eq!(f.platform.messages_for(1).len(), 3);
        assert_eq!(f.backend.call_count(), 0);
    }

    fn with_knowledge(f: Fixture, texts: &[&str]) -> Fixture {
        let kb = KnowledgeBase::from_snippets(
            texts
                .iter()
                .map(|t| Snippet {
                    source: "kb.md".into(),
                    text: (*t).to_string(),
                })
                .collect(),
        );
        let Fixture {
            dispatcher,
            platform,
            backend,
            store,
            metrics,
        } = f;
        Fixture {
            dispatcher: dispatcher.with_knowledge(Arc::new(kb)),
            platform,
            backend,
            store,
            metrics,
        }
    }

    #[tokio::test]
    async fn retrieval_grounds_the_completion() {
        let f = fixture(StubBackend::replying("с 9 до 18"));
        let f = with_knowledge(f, &["Поддержка работает с 9 до 18", "Оплата картой"]);
        greet(&f).await;

        // Phrased without operator-intent stems, which win earlier in the
        // pipeline.
        f.dispatcher
            .handle_event(&incoming(1, "во сколько работает офис"))
            .await
            .unwrap();

        let requests = f.backend.requests.lock().unwrap();
        // Gateway system prompt, then the grounding context.
        let grounding = &requests[0].messages[1];
        assert!(grounding.content.contains("Поддержка работает с 9 до 18"));
        assert!(!grounding.content.contains("Оплата картой"));
        drop(requests);
        assert_eq!(f.platform.messages_for(1).last().unwrap(), "с 9 до 18");
    }

    #[tokio::test]
    async fn empty_retrieval_hands_over_instead_of_guessing() {
        let f = fixture(StubBackend::replying("не должно отправиться"));
        let f = with_knowledge(f, &["Оплата картой"]);
        greet(&f).await;

        f.dispatcher
            .handle_event(&incoming(1, "почините мой телевизор"))
            .await
            .unwrap();

        assert!(f.store.get(1).await.handed_over);
        assert_eq!(f.backend.call_count(), 0);
        assert_eq!(f.metrics.handoffs_no_context.load(Ordering::Relaxed), 1);
        assert_eq!(f.platform.messages_for(1).last().unwrap(), HANDOFF_NOTICE);
        assert_eq!(f.dispatcher.pending_fallbacks(), 1);
    }
}
