//! Accident intake — triggered by "дтп".
//!
//! Three yes/no questions, then a safety checklist. In the terminal step
//! the collected answers feed a bounded number of advisory completions;
//! past the quota the client is pointed at the paid tier.

use async_trait::async_trait;
use tracing::info;

use towline_core::error::Result;
use towline_core::message::ChatMessage;
use towline_core::session::{ScenarioState, ScenarioStep, Session};
use towline_core::text::normalize;

use super::{
    AnswerKind, Outcome, Question, ScenarioHandler, StepResult, TurnContext, advance_questions,
};

pub const NAME: &str = "accident";

const TRIGGER: &str = "дтп";

const QUESTIONS: &[Question] = &[
    Question {
        key: "injured",
        text: "Есть ли пострадавшие? (да / нет)",
        expects: AnswerKind::YesNo,
    },
    Question {
        key: "can_move",
        text: "Автомобиль может двигаться? (да / нет)",
        expects: AnswerKind::YesNo,
    },
    Question {
        key: "on_road",
        text: "Вы на проезжей части? (да / нет)",
        expects: AnswerKind::YesNo,
    },
];

const INTRO: &str = "Я с вами. Сохраняйте спокойствие.\n\nПожалуйста, ответьте на несколько вопросов ниже, чтобы я мог помочь.\nОтвечайте: **да** или **нет**.";

const CHECKLIST: &str = "\n❗ ВАЖНО ПРИ ДТП:\n— Не покидайте место происшествия\n— Включите аварийную сигнализацию\n— Установите знак аварийной остановки\n— Сделайте фото повреждений, номеров и места ДТП\n— Не подписывайте документы, если не уверены\n";

const UPGRADE_REQUIRED: &str = "Я могу продолжить сопровождение и дать подробную консультацию.\n\nПолный доступ доступен по подписке.";

/// Instruction for the advisory completions in the terminal step.
const ADVICE_PROMPT: &str = "Ты автоюрист. Дай краткий, чёткий и понятный совет при ДТП. Без воды.";

/// Advisory completions included before the upgrade message.
const FREE_COMPLETION_QUOTA: u32 = 2;

pub struct AccidentScenario;

#[async_trait]
impl ScenarioHandler for AccidentScenario {
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
            if !normalize(text).contains(TRIGGER) {
                return Ok(Outcome::NotClaimed);
            }
            info!("🚨 Accident intake started for conversation {}", ctx.conversation_id);
            session.scenario = Some(ScenarioState::start(NAME));
            ctx.platform.send_message(ctx.conversation_id, INTRO).await?;
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
                    ctx.platform.send_message(ctx.conversation_id, CHECKLIST).await?;
                }
            }
            ScenarioStep::Complete => {
                if state.free_completions_used >= FREE_COMPLETION_QUOTA {
                    ctx.platform
                        .send_message(ctx.conversation_id, UPGRADE_REQUIRED)
                        .await?;
                    return Ok(Outcome::Claimed);
                }

                // A gateway failure here is not handled locally; it
                // bubbles to the webhook handler's top-level catch.
                let context = serde_json::to_string(&state.answers)?;
                let advice = ctx
                    .gateway
                    .complete(&[ChatMessage::system(ADVICE_PROMPT), ChatMessage::user(&context)])
                    .await?;

                state.free_completions_used += 1;
                ctx.platform.send_message(ctx.conversation_id, &advice).await?;
            }
        }

        Ok(Outcome::Claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::CompletionGateway;
    use crate::testing::{RecordingPlatform, StubBackend};
    use std::sync::Arc;
    use std::time::Duration;

    fn gateway(backend: Arc<StubBackend>) -> CompletionGateway {
        CompletionGateway::new(backend, Duration::from_secs(15))
    }

    async fn drive(
        scenario: &AccidentScenario,
        platform: &RecordingPlatform,
        gw: &CompletionGateway,
        session: &mut Session,
        text: &str,
    ) -> Outcome {
        let ctx = TurnContext {
            conversation_id: 1,
            platform,
            gateway: gw,
        };
        scenario.try_handle(text, &ctx, session).await.unwrap()
    }

    #[tokio::test]
    async fn full_flow_asks_three_questions_then_checklist() {
        let platform = RecordingPlatform::new();
        let backend = Arc::new(StubBackend::replying("совет"));
        let gw = gateway(backend.clone());
        let scenario = AccidentScenario;
        let mut session = Session::new();

        assert_eq!(
            drive(&scenario, &platform, &gw, &mut session, "у меня ДТП!").await,
            Outcome::Claimed
        );
        for answer in ["да", "нет", "да"] {
            assert_eq!(
                drive(&scenario, &platform, &gw, &mut session, answer).await,
                Outcome::Claimed
            );
        }

        let sent = platform.messages_for(1);
        assert_eq!(sent[0], INTRO);
        assert_eq!(sent[1], QUESTIONS[0].text);
        assert_eq!(sent[2], QUESTIONS[1].text);
        assert_eq!(sent[3], QUESTIONS[2].text);
        assert_eq!(sent[4], CHECKLIST);

        let state = session.scenario.as_ref().unwrap();
        assert_eq!(state.step, ScenarioStep::Complete);
        assert_eq!(state.answers["injured"], "yes");
        assert_eq!(state.answers["can_move"], "no");
        assert_eq!(state.answers["on_road"], "yes");
        // No advisory completion until the client speaks again.
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn ambiguous_answer_reprompts_without_advancing() {
        let platform = RecordingPlatform::new();
        let gw = gateway(Arc::new(StubBackend::replying("совет")));
        let scenario = AccidentScenario;
        let mut session = Session::new();

        drive(&scenario, &platform, &gw, &mut session, "дтп").await;
        drive(&scenario, &platform, &gw, &mut session, "может быть").await;

        let state = session.scenario.as_ref().unwrap();
        assert_eq!(state.q_index, 0);
        assert!(state.answers.is_empty());
        assert_eq!(
            platform.messages_for(1).last().unwrap(),
            crate::scenarios::YES_NO_REPROMPT
        );
    }

    #[tokio::test]
    async fn terminal_step_enforces_completion_quota() {
        let platform = RecordingPlatform::new();
        let backend = Arc::new(StubBackend::replying("совет автоюриста"));
        let gw = gateway(backend.clone());
        let scenario = AccidentScenario;
        let mut session = Session::new();

        drive(&scenario, &platform, &gw, &mut session, "дтп").await;
        for answer in ["да", "нет", "да"] {
            drive(&scenario, &platform, &gw, &mut session, answer).await;
        }

        drive(&scenario, &platform, &gw, &mut session, "что мне делать?").await;
        drive(&scenario, &platform, &gw, &mut session, "а дальше?").await;
        drive(&scenario, &platform, &gw, &mut session, "ещё совет").await;

        assert_eq!(backend.call_count(), 2);
        assert_eq!(
            session.scenario.as_ref().unwrap().free_completions_used,
            FREE_COMPLETION_QUOTA
        );
        assert_eq!(platform.messages_for(1).last().unwrap(), UPGRADE_REQUIRED);
    }

    #[tokio::test]
    async fn declines_when_other_scenario_is_active() {
        let platform = RecordingPlatform::new();
        let gw = gateway(Arc::new(StubBackend::replying("совет")));
        let scenario = AccidentScenario;
        let mut session = Session::new();
        session.scenario = Some(ScenarioState::start("breakdown"));

        let outcome = drive(&scenario, &platform, &gw, &mut session, "дтп").await;
        assert_eq!(outcome, Outcome::NotClaimed);
        assert_eq!(platform.message_count(), 0);
        assert_eq!(session.scenario.as_ref().unwrap().name, "breakdown");
    }
}
