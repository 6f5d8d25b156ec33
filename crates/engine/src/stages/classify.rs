//! `classify`: the first stage of a fix session, deciding whether an issue
//! is worth spending further LLM calls on at all. Runs once per session and
//! is never retried — a failed classification call fails the session.

use llm::json_extract::{self, ClassificationPayload};
use store::FixSession;

use crate::context::EngineContext;
use crate::outcome::StageOutcome;
use crate::prompts;

const CLASSIFY_MAX_TOKENS: u32 = 512;

pub async fn classify(ctx: &EngineContext, session: &mut FixSession) -> StageOutcome<ClassificationPayload> {
    let prompt = prompts::classify_prompt(&session.issue);
    let response = match ctx.ask_llm(session, &prompt, CLASSIFY_MAX_TOKENS).await {
        Ok(text) => text,
        Err(error) if error.is_not_admitted() => {
            return StageOutcome::Stalled(format!("classify: {error}"));
        }
        Err(error) => {
            return StageOutcome::Retryable(format!("classify: LLM call failed: {error}"));
        }
    };

    let payload: ClassificationPayload = json_extract::extract(&response).unwrap_or_default();
    StageOutcome::Success(payload)
}

/// `true` if `payload` says this issue should actually be worked. Both
/// `can_auto_fix == false` and `suggested_action == "skip"` land a session
/// on `blocked` with no learning pass.
#[must_use]
pub fn should_proceed(payload: &ClassificationPayload) -> bool {
    payload.can_auto_fix && payload.suggested_action != "skip"
}
