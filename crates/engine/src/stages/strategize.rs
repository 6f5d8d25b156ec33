//! `strategize`: turns an `analyze`d root cause into a concrete,
//! lesson-informed [`FixStrategy`]. Retried (along with `implement` and
//! `test`) up to `max_fix_retries` times per session.

use issues::{Category, Complexity, FixStep, FixStrategy};
use llm::json_extract::{self, StrategyPayload, StrategyStepPayload};
use store::{FixSession, Lesson};

use crate::context::EngineContext;
use crate::files;
use crate::outcome::StageOutcome;
use crate::prompts;

const STRATEGIZE_MAX_TOKENS: u32 = 4096;

/// A successfully-built strategy plus the lesson ids that informed it, so
/// the caller can record their application before attempting it.
#[derive(Debug)]
pub struct Strategized {
    pub strategy: FixStrategy,
    pub lesson_ids: Vec<i64>,
}

pub async fn strategize(
    ctx: &EngineContext,
    session: &mut FixSession,
    root_cause: &str,
    approach: &str,
    affected_files: &[String],
) -> StageOutcome<Strategized> {
    let category = session.issue.category;

    let lessons: Vec<Lesson> = match learning::get_relevant_lessons(
        &ctx.store,
        category.as_str(),
        affected_files,
        ctx.options.max_lessons_per_prompt,
    ) {
        Ok(lessons) => lessons,
        Err(error) => {
            tracing::warn!(%error, "failed to fetch relevant lessons, proceeding without them");
            Vec::new()
        }
    };
    let lesson_ids: Vec<i64> = lessons.iter().map(|l| l.id).collect();

    let file_contents = files::read_many(&ctx.repo_path, affected_files).await;
    let prompt = prompts::strategize_prompt(&session.issue, root_cause, approach, &file_contents, &lessons);

    let response = match ctx.ask_llm(session, &prompt, STRATEGIZE_MAX_TOKENS).await {
        Ok(text) => text,
        Err(error) if error.is_not_admitted() => {
            return StageOutcome::Stalled(format!("strategize: {error}"));
        }
        Err(error) => {
            return StageOutcome::Retryable(format!("strategize: LLM call failed: {error}"));
        }
    };

    let payload: StrategyPayload = match json_extract::extract(&response) {
        Ok(payload) => payload,
        Err(error) => {
            return StageOutcome::Retryable(format!("strategize: could not parse strategy: {error}"));
        }
    };

    let steps = match build_steps(payload.steps) {
        Ok(steps) => steps,
        Err(error) => return StageOutcome::Retryable(format!("strategize: {error}")),
    };

    let mut strategy = match FixStrategy::new(
        Complexity::from_loose(&payload.complexity),
        payload.description,
        steps,
        payload.requires_approval,
        payload.rollback_plan,
    ) {
        Ok(strategy) => strategy,
        Err(error) => return StageOutcome::Retryable(format!("strategize: {error}")),
    };
    strategy.force_approval_for_category(category);

    if let Err(error) = learning::record_lesson_application(&ctx.store, &lesson_ids, session.id) {
        tracing::warn!(%error, "failed to record lesson application");
    }

    StageOutcome::Success(Strategized { strategy, lesson_ids })
}

/// Convert the loosely-typed LLM step payloads into real [`FixStep`]s,
/// dropping any step missing the fields its `type` requires. Returns an
/// error string (not a `StageOutcome` directly, so callers control the
/// wrapping) if nothing usable survives.
fn build_steps(raw_steps: Vec<StrategyStepPayload>) -> Result<Vec<FixStep>, String> {
    let mut steps = Vec::with_capacity(raw_steps.len());
    for raw in raw_steps {
        match raw.step_type.as_str() {
            "edit_file" => {
                let (Some(old_code), Some(new_code)) = (raw.old_code, raw.new_code) else {
                    tracing::warn!(file = %raw.file, "dropping edit_file step missing old_code/new_code");
                    continue;
                };
                if raw.file.trim().is_empty() || old_code.trim().is_empty() {
                    continue;
                }
                steps.push(FixStep::EditFile {
                    file: raw.file,
                    old_code,
                    new_code,
                    description: raw.description,
                });
            }
            "add_test" => {
                let Some(code) = raw.code else {
                    tracing::warn!(file = %raw.file, "dropping add_test step missing code");
                    continue;
                };
                if raw.file.trim().is_empty() || code.trim().is_empty() {
                    continue;
                }
                steps.push(FixStep::AddTest { file: raw.file, code });
            }
            other => tracing::warn!(step_type = %other, "dropping unrecognized step type"),
        }
    }

    if steps.is_empty() {
        return Err("no usable steps survived validation".to_string());
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_steps_drops_edit_file_missing_new_code() {
        let raw = vec![
            StrategyStepPayload {
                step_type: "edit_file".to_string(),
                file: "src/a.rs".to_string(),
                old_code: Some("fn a() {}".to_string()),
                new_code: None,
                code: None,
                description: String::new(),
            },
            StrategyStepPayload {
                step_type: "edit_file".to_string(),
                file: "src/b.rs".to_string(),
                old_code: Some("fn b() {}".to_string()),
                new_code: Some("fn b() { 1 }".to_string()),
                code: None,
                description: "fix b".to_string(),
            },
        ];
        let steps = build_steps(raw).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].file(), "src/b.rs");
    }

    #[test]
    fn build_steps_errors_when_nothing_survives() {
        let raw = vec![StrategyStepPayload {
            step_type: "mystery".to_string(),
            file: "src/a.rs".to_string(),
            old_code: None,
            new_code: None,
            code: None,
            description: String::new(),
        }];
        assert!(build_steps(raw).is_err());
    }
}
