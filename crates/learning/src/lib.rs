//! Turns recorded stage-level failures into prevention rules, and ranks
//! which prevention rules are worth surfacing for a new issue before the
//! engine spends an LLM call strategizing it.

use std::sync::Arc;

use llm::json_extract::{self, AnalysisPayload};
use llm::{LlmClient, LlmError};
use store::{Lesson, Store, StoreError};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LearningError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

const ANALYSIS_MAX_TOKENS: u32 = 1024;
const DEFAULT_PRUNE_MIN_APPLICATIONS: i64 = 5;
const DEFAULT_PRUNE_MIN_SUCCESS_RATE: f64 = 0.3;

fn analysis_prompt(stage: &str, error: &str, title: &str, context: Option<&str>) -> String {
    format!(
        "A fix-session failed during the \"{stage}\" stage.\n\
         Issue: {title}\n\
         Error: {error}\n\
         Context: {context}\n\n\
         Respond with a single JSON object describing what went wrong and how to prevent it:\n\
         {{\"failure_type\": string, \"root_cause\": string, \"lesson\": string, \"prevention_rule\": string}}\n\
         `prevention_rule` must be a short, reusable, specific directive (not the fix itself).",
        context = context.unwrap_or("none"),
    )
}

/// Analyzes every unanalyzed failure recorded for `session_id`, asking the
/// model for a root cause and a prevention rule per failure, and folds each
/// into the lesson store (deduped by exact `prevention_rule` text).
pub async fn analyze_and_learn(
    store: &Arc<Store>,
    llm: &Arc<dyn LlmClient>,
    session_id: Uuid,
) -> Result<Vec<i64>, LearningError> {
    let unanalyzed = store.unanalyzed_failures(session_id)?;
    let mut lesson_ids = Vec::with_capacity(unanalyzed.len());

    for failure in unanalyzed {
        let prompt = analysis_prompt(
            &failure.stage,
            &failure.error,
            &failure.title,
            failure.context.as_deref(),
        );
        let response = llm.ask(&prompt, ANALYSIS_MAX_TOKENS, None).await?;
        let payload: AnalysisPayload =
            json_extract::extract(&response.text).unwrap_or_default();

        if payload.prevention_rule.trim().is_empty() {
            tracing::warn!(failure_id = failure.id, "analysis produced no prevention rule");
            store.mark_failure_analyzed(failure.id)?;
            continue;
        }

        let lesson_id = store.create_lesson(
            &payload.failure_type,
            &payload.root_cause,
            &payload.lesson,
            &payload.prevention_rule,
            &failure.category,
            &failure.files,
        )?;
        store.mark_failure_analyzed(failure.id)?;
        lesson_ids.push(lesson_id);
    }

    Ok(lesson_ids)
}

/// Active lessons worth surfacing to the strategize stage for `category`
/// and the files an issue touches, ranked best-first.
pub fn get_relevant_lessons(
    store: &Store,
    category: &str,
    files: &[String],
    limit: usize,
) -> Result<Vec<Lesson>, LearningError> {
    Ok(store.relevant_lessons(category, files, limit)?)
}

/// Records that `lesson_ids` were consulted while working `session_id`, so
/// the eventual outcome can be attributed back to them.
pub fn record_lesson_application(
    store: &Store,
    lesson_ids: &[i64],
    session_id: Uuid,
) -> Result<(), LearningError> {
    if lesson_ids.is_empty() {
        return Ok(());
    }
    Ok(store.record_lesson_application(lesson_ids, session_id)?)
}

/// Records whether `session_id` ultimately succeeded, crediting or
/// debiting every lesson that was applied to it.
pub fn record_outcome(store: &Store, session_id: Uuid, success: bool) -> Result<(), LearningError> {
    Ok(store.record_outcome(session_id, success)?)
}

/// Deactivates lessons that have accumulated enough applications to trust
/// their success rate, and whose success rate is nonetheless poor.
pub fn prune(store: &Store) -> Result<u32, LearningError> {
    Ok(store.prune_lessons(DEFAULT_PRUNE_MIN_APPLICATIONS, DEFAULT_PRUNE_MIN_SUCCESS_RATE)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm::LlmResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLlm {
        responses: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn ask(
            &self,
            _prompt: &str,
            _max_tokens: u32,
            _model: Option<&str>,
        ) -> Result<LlmResponse, LlmError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse {
                text: self.responses[i.min(self.responses.len() - 1)].clone(),
                input_tokens: 10,
                output_tokens: 10,
            })
        }
    }

    #[tokio::test]
    async fn analyzes_failure_and_creates_lesson() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let session_id = Uuid::new_v4();
        store
            .record_failure(
                session_id,
                "implement",
                "old_code not unique",
                "ux",
                "Login button misaligned",
                &["templates/login.hbs".to_string()],
                None,
                None,
            )
            .unwrap();

        let llm: Arc<dyn LlmClient> = Arc::new(StubLlm {
            responses: vec![serde_json::json!({
                "failure_type": "ambiguous_anchor",
                "root_cause": "old_code matched twice",
                "lesson": "include surrounding context",
                "prevention_rule": "always include at least one unique line of context in old_code"
            })
            .to_string()],
            calls: AtomicUsize::new(0),
        });

        let lesson_ids = analyze_and_learn(&store, &llm, session_id).await.unwrap();
        assert_eq!(lesson_ids.len(), 1);
        assert!(store.unanalyzed_failures(session_id).unwrap().is_empty());

        let lessons = get_relevant_lessons(&store, "ux", &[], 10).unwrap();
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].prevention_rule, "always include at least one unique line of context in old_code");
    }

    #[tokio::test]
    async fn skips_lesson_creation_when_prevention_rule_is_empty() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let session_id = Uuid::new_v4();
        store
            .record_failure(session_id, "test", "flaky", "bug", "t", &[], None, None)
            .unwrap();

        let llm: Arc<dyn LlmClient> = Arc::new(StubLlm {
            responses: vec!["{}".to_string()],
            calls: AtomicUsize::new(0),
        });

        let lesson_ids = analyze_and_learn(&store, &llm, session_id).await.unwrap();
        assert!(lesson_ids.is_empty());
        assert!(store.unanalyzed_failures(session_id).unwrap().is_empty());
    }
}
