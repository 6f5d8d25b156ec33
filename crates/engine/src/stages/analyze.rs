//! `analyze`: root-cause investigation against the actual repository
//! contents. Runs once per session; a failed or unparseable response fails
//! the session outright rather than retrying.

use llm::json_extract::{self, IssueAnalysisPayload};
use store::{FixSession, SessionStatus};

use crate::context::EngineContext;
use crate::files;
use crate::outcome::StageOutcome;
use crate::prompts;

const ANALYZE_MAX_TOKENS: u32 = 2048;
const ALWAYS_INCLUDE: &[&str] = &["README.md", "Cargo.toml"];

pub async fn analyze(ctx: &EngineContext, session: &mut FixSession) -> StageOutcome<IssueAnalysisPayload> {
    let mut paths = session.issue.referenced_files();
    for extra in ALWAYS_INCLUDE {
        if !paths.iter().any(|p| p == extra) {
            paths.push((*extra).to_string());
        }
    }

    let file_contents = files::read_many(&ctx.repo_path, &paths).await;
    let prompt = prompts::analyze_prompt(&session.issue, &file_contents);

    let response = match ctx.ask_llm(session, &prompt, ANALYZE_MAX_TOKENS).await {
        Ok(text) => text,
        Err(error) if error.is_not_admitted() => {
            return StageOutcome::Stalled(format!("analyze: {error}"));
        }
        Err(error) => {
            return StageOutcome::Terminal(SessionStatus::Failed, format!("analyze: LLM call failed: {error}"));
        }
    };

    match json_extract::extract::<IssueAnalysisPayload>(&response) {
        Ok(payload) => StageOutcome::Success(payload),
        Err(error) => StageOutcome::Terminal(SessionStatus::Failed, format!("analyze: could not parse analysis: {error}")),
    }
}
