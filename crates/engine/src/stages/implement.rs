//! `implement`: apply a [`FixStrategy`]'s steps to the checked-out repo.
//! Runs under `ctx.repo_lock`; the caller owns acquiring/releasing it.

use issues::{FixStep, FixStrategy};
use store::FixSession;

use crate::context::EngineContext;
use crate::outcome::StageOutcome;

/// Apply every step in order. `edit_file` steps are attempted independently
/// of one another — one step's failure doesn't stop the rest from being
/// tried — and the stage as a whole succeeds as long as at least one
/// `edit_file` landed (§4.2: "successful iff at least one `edit_file`
/// succeeded and every attempted `edit_file` either succeeded or was
/// non-fatal"). `add_test` is accepted as a no-op to avoid generating
/// fragile tests; it never touches the filesystem.
pub async fn implement(ctx: &EngineContext, session: &mut FixSession, strategy: &FixStrategy) -> StageOutcome<()> {
    if !strategy.steps.iter().any(FixStep::is_edit_file) {
        return StageOutcome::Retryable("implement: incomplete strategy (no edit_file steps)".to_string());
    }

    let mut edits_attempted = 0u32;
    let mut edits_applied = 0u32;

    for step in &strategy.steps {
        let FixStep::EditFile { file, old_code, new_code, .. } = step else {
            continue;
        };
        edits_attempted += 1;
        match apply_edit(ctx, file, old_code, new_code).await {
            Ok(()) => {
                edits_applied += 1;
                session.files_modified.insert(file.clone());
            }
            Err(error) => {
                tracing::warn!(file = %file, %error, "edit_file step did not apply; continuing with remaining steps");
            }
        }
    }

    if edits_applied == 0 {
        return StageOutcome::Retryable(format!(
            "implement: none of {edits_attempted} edit_file step(s) could be applied"
        ));
    }

    StageOutcome::Success(())
}

async fn apply_edit(ctx: &EngineContext, file: &str, old_code: &str, new_code: &str) -> Result<(), String> {
    let path = ctx.repo_path.join(file);
    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|error| format!("{file}: failed to read: {error}"))?;
    let outcome = ctx
        .editor
        .apply(&contents, old_code, new_code)
        .map_err(|error| format!("{file}: {error}"))?;
    write_file(&path, &outcome.contents).await
}

async fn write_file(path: &std::path::Path, contents: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| format!("{}: failed to create parent dirs: {error}", path.display()))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|error| format!("{}: failed to write: {error}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Options;
    use issues::{Category, Complexity, Issue, RawIssue};
    use llm::{LlmClient, LlmError, LlmResponse};
    use notify::Notifier;
    use safety::{CostTracker, RateLimiter};
    use scm::{CiCheck, PrHandle, VcsGateway};
    use std::collections::HashMap;
    use std::sync::Arc;
    use store::Store;
    use verify::{NoopDeployer, Verifier};

    use crate::issue_source::NullIssueSource;

    struct StubLlm;
    #[async_trait::async_trait]
    impl LlmClient for StubLlm {
        async fn ask(&self, _prompt: &str, _max_tokens: u32, _model: Option<&str>) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                text: String::new(),
                input_tokens: 0,
                output_tokens: 0,
            })
        }
    }

    struct StubVcs;
    #[async_trait::async_trait]
    impl VcsGateway for StubVcs {
        async fn create_branch(&self, _repo_path: &std::path::Path, _branch_name: &str, _base: &str) -> issues::WorkerResult<()> {
            Ok(())
        }
        async fn commit(&self, _repo_path: &std::path::Path, _message: &str) -> issues::WorkerResult<String> {
            Ok("deadbeef".to_string())
        }
        async fn push(&self, _repo_path: &std::path::Path, _branch_name: &str) -> issues::WorkerResult<()> {
            Ok(())
        }
        async fn open_pr(
            &self,
            _repo_path: &std::path::Path,
            _branch_name: &str,
            _base: &str,
            _title: &str,
            _body: &str,
        ) -> issues::WorkerResult<PrHandle> {
            Ok(PrHandle {
                number: 1,
                url: "https://example.invalid/pr/1".to_string(),
            })
        }
        async fn poll_checks(&self, _repo_path: &std::path::Path, _pr_number: u32) -> issues::WorkerResult<Vec<CiCheck>> {
            Ok(Vec::new())
        }
        async fn fetch_failed_logs(&self, _repo_path: &std::path::Path, _pr_number: u32, _check_name: &str) -> issues::WorkerResult<String> {
            Ok(String::new())
        }
        async fn rollback(&self, _repo_path: &std::path::Path, _branch_name: &str) -> issues::WorkerResult<()> {
            Ok(())
        }
    }

    fn test_ctx(repo_path: std::path::PathBuf) -> EngineContext {
        let mut options = Options::default();
        options.repository_path = repo_path.to_string_lossy().to_string();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut ctx = EngineContext::new(
            Arc::new(options),
            store.clone(),
            Arc::new(StubLlm),
            Arc::new(Notifier::disabled()),
            Arc::new(StubVcs),
            Arc::new(Verifier::default()),
            Arc::new(NoopDeployer),
            Arc::new(CostTracker::new(store, 50.0)),
            Arc::new(RateLimiter::new(HashMap::new())),
            Arc::new(NullIssueSource),
        );
        ctx.repo_path = repo_path;
        ctx
    }

    #[tokio::test]
    async fn implement_applies_an_edit_and_records_the_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.rs"), "fn a() {}\n").await.unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());

        let strategy = FixStrategy::new(
            Complexity::Simple,
            "fix a",
            vec![FixStep::EditFile {
                file: "a.rs".to_string(),
                old_code: "fn a() {}".to_string(),
                new_code: "fn a() { 1 }".to_string(),
                description: String::new(),
            }],
            false,
            "revert",
        )
        .unwrap();

        let mut session = FixSession::new(Issue::normalize(RawIssue {
            category: Some(Category::Bug.as_str().to_string()),
            ..Default::default()
        }));

        let outcome = implement(&ctx, &mut session, &strategy).await;
        assert!(outcome.is_success());
        assert!(session.files_modified.contains("a.rs"));
        let contents = tokio::fs::read_to_string(dir.path().join("a.rs")).await.unwrap();
        assert!(contents.contains("fn a() { 1 }"));
    }

    #[tokio::test]
    async fn implement_is_retryable_when_old_code_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.rs"), "fn a() {}\n").await.unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());

        let strategy = FixStrategy::new(
            Complexity::Simple,
            "fix a",
            vec![FixStep::EditFile {
                file: "a.rs".to_string(),
                old_code: "fn nowhere() {}".to_string(),
                new_code: "fn nowhere() { 1 }".to_string(),
                description: String::new(),
            }],
            false,
            "revert",
        )
        .unwrap();

        let mut session = FixSession::new(Issue::normalize(RawIssue::default()));
        let outcome = implement(&ctx, &mut session, &strategy).await;
        assert!(matches!(outcome, StageOutcome::Retryable(_)));
    }

    #[tokio::test]
    async fn succeeds_when_one_edit_applies_even_if_another_does_not() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.rs"), "fn a() {}\n").await.unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());

        let strategy = FixStrategy::new(
            Complexity::Simple,
            "fix a, attempt b",
            vec![
                FixStep::EditFile {
                    file: "a.rs".to_string(),
                    old_code: "fn a() {}".to_string(),
                    new_code: "fn a() { 1 }".to_string(),
                    description: String::new(),
                },
                FixStep::EditFile {
                    file: "missing.rs".to_string(),
                    old_code: "fn b() {}".to_string(),
                    new_code: "fn b() { 1 }".to_string(),
                    description: String::new(),
                },
            ],
            false,
            "revert",
        )
        .unwrap();

        let mut session = FixSession::new(Issue::normalize(RawIssue::default()));
        let outcome = implement(&ctx, &mut session, &strategy).await;
        assert!(outcome.is_success());
        assert!(session.files_modified.contains("a.rs"));
        assert!(!session.files_modified.contains("missing.rs"));
    }

    #[tokio::test]
    async fn add_test_step_is_a_no_op_that_never_touches_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.rs"), "fn a() {}\n").await.unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());

        let strategy = FixStrategy::new(
            Complexity::Simple,
            "fix a, add a test",
            vec![
                FixStep::EditFile {
                    file: "a.rs".to_string(),
                    old_code: "fn a() {}".to_string(),
                    new_code: "fn a() { 1 }".to_string(),
                    description: String::new(),
                },
                FixStep::AddTest {
                    file: "tests/a_test.rs".to_string(),
                    code: "#[test] fn a_works() {}".to_string(),
                },
            ],
            false,
            "revert",
        )
        .unwrap();

        let mut session = FixSession::new(Issue::normalize(RawIssue::default()));
        let outcome = implement(&ctx, &mut session, &strategy).await;
        assert!(outcome.is_success());
        assert!(!session.files_modified.contains("tests/a_test.rs"));
        assert!(tokio::fs::metadata(dir.path().join("tests/a_test.rs")).await.is_err());
    }
}
