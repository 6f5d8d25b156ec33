//! `ci_repair_loop`'s per-failure repair attempt: a trivial formatter pass
//! for `Formatting` failures, an LLM-proposed single-file edit for
//! everything else. `session.rs` owns polling, committing, and the
//! attempt-count budget; this module only owns producing one fix.

use std::process::Stdio;

use llm::json_extract::{self, CiFixPayload};
use scm::CiFailure;
use tokio::process::Command;

use crate::context::EngineContext;
use crate::files;
use crate::prompts;

const CI_FIX_MAX_TOKENS: u32 = 2048;

/// What a repair attempt produced.
pub enum RepairOutcome {
    /// A file was changed and is ready to be committed.
    Applied { file: String },
    /// No fix could be produced for this failure; the caller should treat
    /// the attempt as spent without anything to commit.
    NoActionableFix(String),
}

pub async fn repair(
    ctx: &EngineContext,
    session: &mut store::FixSession,
    failure: &CiFailure,
    strategy_description: &str,
) -> RepairOutcome {
    if matches!(failure.kind, scm::CiFailureKind::Formatting) {
        return run_formatter(ctx).await;
    }

    let file_snippet = match &failure.file_path {
        Some(path) => files::read_capped(&ctx.repo_path, path).await,
        None => None,
    };
    let prompt = prompts::ci_fix_prompt(failure, file_snippet.as_deref(), strategy_description);

    let response = match ctx.ask_llm(session, &prompt, CI_FIX_MAX_TOKENS).await {
        Ok(text) => text,
        Err(error) => return RepairOutcome::NoActionableFix(format!("ci-fix LLM call failed: {error}")),
    };

    let payload: CiFixPayload = match json_extract::extract(&response) {
        Ok(payload) => payload,
        Err(error) => return RepairOutcome::NoActionableFix(format!("could not parse ci-fix response: {error}")),
    };

    if payload.file.trim().is_empty() || payload.old_code.trim().is_empty() {
        return RepairOutcome::NoActionableFix("ci-fix response named no actionable edit".to_string());
    }

    apply_edit(ctx, session, &payload).await
}

async fn apply_edit(ctx: &EngineContext, session: &mut store::FixSession, payload: &CiFixPayload) -> RepairOutcome {
    let path = ctx.repo_path.join(&payload.file);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(error) => return RepairOutcome::NoActionableFix(format!("{}: failed to read: {error}", payload.file)),
    };

    let outcome = match ctx.editor.apply(&contents, &payload.old_code, &payload.new_code) {
        Ok(outcome) => outcome,
        Err(error) => return RepairOutcome::NoActionableFix(format!("{}: {error}", payload.file)),
    };

    if let Some(parent) = path.parent() {
        if let Err(error) = tokio::fs::create_dir_all(parent).await {
            return RepairOutcome::NoActionableFix(format!("{}: failed to create parent dirs: {error}", payload.file));
        }
    }
    if let Err(error) = tokio::fs::write(&path, &outcome.contents).await {
        return RepairOutcome::NoActionableFix(format!("{}: failed to write: {error}", payload.file));
    }

    session.files_modified.insert(payload.file.clone());
    RepairOutcome::Applied {
        file: payload.file.clone(),
    }
}

async fn run_formatter(ctx: &EngineContext) -> RepairOutcome {
    let command = ctx.verifier.format_fix_command();
    let Some((program, args)) = command.split_first() else {
        return RepairOutcome::NoActionableFix("no formatter write-mode command configured".to_string());
    };

    let output = Command::new(program)
        .args(args)
        .current_dir(&ctx.repo_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => RepairOutcome::Applied {
            file: "(formatter pass)".to_string(),
        },
        Ok(output) => RepairOutcome::NoActionableFix(format!(
            "formatter write-mode invocation failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )),
        Err(error) => RepairOutcome::NoActionableFix(format!("failed to run formatter: {error}")),
    }
}
