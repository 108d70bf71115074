//! Breakdown intake — triggered by "поломка", "эвакуатор", "не заводится".
//!
//! Three free-text questions and a plain closing message. No completion
//! call anywhere in this flow.

use async_trait::async_trait;
use tracing::info;

use towline_core::error::Result;
use towline_core::session::{ScenarioState, ScenarioStep, Session};
use towline_core::text::normalize;

use super::{
    AnswerKind, Outcome, Question, ScenarioHandler, StepResult, TurnContext, advance_questions,
};

pub const NAME: &str = "breakdown";

const TRIGGERS: &[&str] = &["поломка", "эвакуатор", "не заводится"];

const QUESTIONS: &[Question] = &[
    Question {
        key: "car",
        text: "Какая марка и модель автомобиля?",
        expects: AnswerKind::FreeText,
    },
    Question {
        key: "problem",
        text: "Что произошло с машиной?",
        expects: AnswerKind::FreeText,
    },
    Question {
        key: "can_move",
        text: "Автомобиль может двигаться? (да / нет)",
        expects: AnswerKind::FreeText,
    },
];

const ACK: &str = "Понял. Сейчас задам несколько вопросов.";

const CLOSING: &str = "Спасибо. Сейчас подберём подходящую помощь.";

pub struct BreakdownScenario;

#[async_trait]
impl ScenarioHandler for BreakdownScenario {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn try_handle(
        &self,
        text: &str,
        ctx: &TurnContext<'_>,
        session: &mut Session,
    ) -> Result<Outcome> {
        if session.scenario.is_none() {
            let t = normalize(text);
            if !TRIGGERS.iter().any(|w| t.contains(w)) {
                return Ok(Outcome::NotClaimed);
            }
            info!("🔧 Breakdown intake started for conversation {}", ctx.conversation_id);
            session.scenario = Some(ScenarioState::start(NAME));
            ctx.platform.send_message(ctx.conversation_id, ACK).await?;
            ctx.platform
                .send_message(ctx.conversation_id, QUESTIONS[0].text)
                .await?;
            return Ok(Outcome::Claimed);
        }

        let Some(state) = session.scenario.as_mut().filter(|s| s.name == NAME) else {
            return Ok(Outcome::NotClaimed);
        };

        match state.step {
            ScenarioStep::Questions => {
                if let StepResult::Finished = advance_questions(QUESTIONS, text, ctx, state).await? {
                    ctx.platform.send_message(ctx.conversation_id, CLOSING).await?;
                }
            }
            // Terminal step is idempotent: repeat turns just re-emit the
            // closing message.
            ScenarioStep::Complete => {
                ctx.platform.send_message(ctx.conversation_id, CLOSING).await?;
            }
        }

        Ok(Outcome::Claimed)
    }
}
