//! Scripted intake scenarios — fixed-step guided question flows.
//!
//! Each scenario is a self-contained step machine behind the
//! [`ScenarioHandler`] trait. The dispatcher offers every inbound turn to
//! the registry in order; the first handler that claims it ends the
//! pipeline. A handler claims when its trigger keyword activates it or
//! when its own scenario is already running; it declines — with no side
//! effects — when a different scenario is active.

use std::sync::Arc;

use async_trait::async_trait;

use towline_core::error::Result;
use towline_core::platform::Platform;
use towline_core::session::{ScenarioState, ScenarioStep, Session};
use towline_core::text::yes_no;

use crate::gateway::CompletionGateway;

pub mod accident;
pub mod breakdown;

pub use accident::AccidentScenario;
pub use breakdown::BreakdownScenario;

/// Per-turn context handed to scenario modules.
pub struct TurnContext<'a> {
    pub conversation_id: i64,
    pub platform: &'a dyn Platform,
    pub gateway: &'a CompletionGateway,
}

/// Did a handler consume the turn?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Claimed,
    NotClaimed,
}

/// Scenario handler — implement one per guided intake flow.
#[async_trait]
pub trait ScenarioHandler: Send + Sync {
    /// Stable scenario name stored in `ScenarioState::name`.
    fn name(&self) -> &'static str;

    /// Consume the turn or decline it. Declining must leave the session
    /// untouched and produce no side effects.
    async fn try_handle(
        &self,
        text: &str,
        ctx: &TurnContext<'_>,
        session: &mut Session,
    ) -> Result<Outcome>;
}

/// The fixed dispatch order.
pub fn default_registry() -> Vec<Arc<dyn ScenarioHandler>> {
    vec![Arc::new(AccidentScenario), Arc::new(BreakdownScenario)]
}

/// Expected answer shape for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKind {
    /// Must normalize to yes or no; anything else re-prompts.
    YesNo,
    /// Stored verbatim.
    FreeText,
}

/// One question in a scenario's fixed list.
pub struct Question {
    pub key: &'static str,
    pub text: &'static str,
    pub expects: AnswerKind,
}

/// Re-prompt sent when a yes/no question gets an ambiguous answer.
pub const YES_NO_REPROMPT: &str =
    "Пожалуйста, ответьте **да** или **нет**. Это важно, чтобы я мог правильно помочь.";

/// Result of feeding one answer into the question list.
pub(crate) enum StepResult {
    /// Answer stored, next question sent.
    Advanced,
    /// Invalid yes/no answer; question re-asked, `q_index` unchanged.
    Reprompted,
    /// All questions answered; step moved to `Complete`. The caller emits
    /// its terminal message.
    Finished,
}

/// Shared question-stepping logic: validate the answer for the question
/// at `q_index`, store it, advance, and ask the next question if any.
pub(crate) async fn advance_questions(
    questions: &[Question],
    text: &str,
    ctx: &TurnContext<'_>,
    state: &mut ScenarioState,
) -> Result<StepResult> {
    let Some(question) = questions.get(state.q_index) else {
        state.step = ScenarioStep::Complete;
        return Ok(StepResult::Finished);
    };

    let answer = match question.expects {
        AnswerKind::YesNo => match yes_no(text) {
            Some(value) => value.as_str().to_string(),
            None => {
                ctx.platform
                    .send_message(ctx.conversation_id, YES_NO_REPROMPT)
                    .await?;
                return Ok(StepResult::Reprompted);
            }
        },
        AnswerKind::FreeText => text.to_string(),
    };

    state.answers.insert(question.key.to_string(), answer);
    state.q_index += 1;

    if let Some(next) = questions.get(state.q_index) {
        ctx.platform
            .send_message(ctx.conversation_id, next.text)
            .await?;
        Ok(StepResult::Advanced)
    } else {
        state.step = ScenarioStep::Complete;
        Ok(StepResult::Finished)
    }
}
