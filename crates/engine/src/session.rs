//! Per-session runner: owns every status transition, the
//! strategize/implement/test retry loop, the CI-repair loop, and the
//! optional deploy/validate stages. One `run_session` call drives a
//! [`FixSession`] from `queued` to a terminal status.

use issues::FixStrategy;
use store::{FixSession, SessionStatus};

use crate::context::EngineContext;
use crate::outcome::StageOutcome;
use crate::stages::{analyze, ci_repair, classify, implement, strategize};

/// What became of a session after one pass through `run_session`.
pub enum SessionOutcome {
    /// The session reached a terminal status (or is still non-terminal
    /// but genuinely working, e.g. still retrying internally).
    Terminal,
    /// A safety gate declined an LLM call; `session` is unchanged aside
    /// from being left in its current non-terminal status and should be
    /// re-enqueued after a backoff, not treated as failed.
    Stalled(Box<FixSession>),
}

/// Run `session` to a terminal status. Persists after every transition, so
/// a crash mid-session leaves a resumable (if stalled) record behind.
pub async fn run_session(ctx: EngineContext, mut session: FixSession) -> SessionOutcome {
    notify_started(&ctx, &session);

    let classification = match classify::classify(&ctx, &mut session).await {
        StageOutcome::Success(payload) => payload,
        StageOutcome::Stalled(reason) => {
            tracing::info!(session_id = %session.id, reason, "classify stalled on a safety gate");
            persist(&ctx, &session);
            return SessionOutcome::Stalled(Box::new(session));
        }
        StageOutcome::Retryable(reason) | StageOutcome::Terminal(_, reason) => {
            finish(&ctx, &mut session, SessionStatus::Failed, reason, true).await;
            return SessionOutcome::Terminal;
        }
    };

    if !classify::should_proceed(&classification) {
        finish(&ctx, &mut session, SessionStatus::Blocked, classification.reason, false).await;
        return SessionOutcome::Terminal;
    }

    transition(&ctx, &mut session, SessionStatus::Analyzing);
    let analysis = match analyze::analyze(&ctx, &mut session).await {
        StageOutcome::Success(payload) => payload,
        StageOutcome::Stalled(reason) => {
            tracing::info!(session_id = %session.id, reason, "analyze stalled on a safety gate");
            persist(&ctx, &session);
            return SessionOutcome::Stalled(Box::new(session));
        }
        StageOutcome::Retryable(reason) | StageOutcome::Terminal(_, reason) => {
            finish(&ctx, &mut session, SessionStatus::Failed, reason, true).await;
            return SessionOutcome::Terminal;
        }
    };

    let max_attempts = ctx.options.max_fix_retries.max(1);
    let mut repo_guard: Option<tokio::sync::OwnedMutexGuard<()>> = None;
    let mut final_strategy: Option<FixStrategy> = None;
    let mut last_reason = String::new();

    for attempt in 1..=max_attempts {
        session.strategy_attempts = attempt;
        transition(&ctx, &mut session, SessionStatus::Strategizing);

        let strategized = match strategize::strategize(
            &ctx,
            &mut session,
            &analysis.root_cause,
            &analysis.approach,
            &analysis.affected_files,
        )
        .await
        {
            StageOutcome::Success(s) => s,
            StageOutcome::Stalled(reason) => {
                tracing::info!(session_id = %session.id, reason, "strategize stalled on a safety gate");
                persist(&ctx, &session);
                return SessionOutcome::Stalled(Box::new(session));
            }
            StageOutcome::Retryable(reason) => {
                record_failure(&ctx, &session, "strategize", &reason, None);
                last_reason = reason;
                continue;
            }
            StageOutcome::Terminal(status, reason) => {
                finish(&ctx, &mut session, status, reason, true).await;
                return SessionOutcome::Terminal;
            }
        };

        session.strategy = Some(strategized.strategy.clone());
        session.applied_lesson_ids.extend(strategized.lesson_ids.iter().copied());

        let (needs_approval, approval_reason) =
            safety::ApprovalGate::needs_approval(&session.issue, &strategized.strategy);
        if needs_approval {
            transition(&ctx, &mut session, SessionStatus::AwaitingApproval);
            let request = notify::ApprovalRequest::new(session.id, approval_reason.clone());
            tracing::info!(
                session_id = %session.id,
                request_id = %request.id,
                reason = %approval_reason,
                "awaiting approval; resolve with `orchestrator approve/reject <request_id>`"
            );
            let outcome = ctx
                .notifier
                .request_approval(request, ctx.options.approval_timeout())
                .await;
            match outcome {
                notify::ApprovalOutcome::Approved => {}
                notify::ApprovalOutcome::Rejected => {
                    finish(
                        &ctx,
                        &mut session,
                        SessionStatus::Blocked,
                        format!("approval rejected: {approval_reason}"),
                        false,
                    )
                    .await;
                    return SessionOutcome::Terminal;
                }
                notify::ApprovalOutcome::TimedOut => {
                    finish(
                        &ctx,
                        &mut session,
                        SessionStatus::Blocked,
                        format!("approval timed out: {approval_reason}"),
                        false,
                    )
                    .await;
                    return SessionOutcome::Terminal;
                }
            }
        }

        transition(&ctx, &mut session, SessionStatus::Implementing);
        let guard = ctx.repo_lock.clone().lock_owned().await;
        let branch = branch_name_for(&ctx, &session);

        if let Err(error) = ctx
            .vcs
            .create_branch(&ctx.repo_path, &branch, &ctx.options.default_branch)
            .await
        {
            record_failure(&ctx, &session, "implement", &error.to_string(), None);
            last_reason = error.to_string();
            continue;
        }
        session.branch_name = Some(branch.clone());

        match implement::implement(&ctx, &mut session, &strategized.strategy).await {
            StageOutcome::Success(()) => {}
            StageOutcome::Retryable(reason) => {
                let _ = ctx.vcs.rollback(&ctx.repo_path, &branch).await;
                session.branch_name = None;
                session.files_modified.clear();
                record_failure(&ctx, &session, "implement", &reason, Some(&strategized.strategy));
                last_reason = reason;
                continue;
            }
            StageOutcome::Terminal(status, reason) => {
                let _ = ctx.vcs.rollback(&ctx.repo_path, &branch).await;
                finish(&ctx, &mut session, status, reason, true).await;
                return SessionOutcome::Terminal;
            }
        }

        transition(&ctx, &mut session, SessionStatus::Testing);
        let report = match ctx.verifier.run(&ctx.repo_path).await {
            Ok(report) => report,
            Err(error) => {
                let _ = ctx.vcs.rollback(&ctx.repo_path, &branch).await;
                session.branch_name = None;
                session.files_modified.clear();
                record_failure(&ctx, &session, "test", &error.to_string(), Some(&strategized.strategy));
                last_reason = error.to_string();
                continue;
            }
        };

        if !report.all_passed() {
            let _ = ctx.vcs.rollback(&ctx.repo_path, &branch).await;
            session.branch_name = None;
            session.files_modified.clear();
            record_failure(&ctx, &session, "test", "verification step(s) failed", Some(&strategized.strategy));
            last_reason = "verification failed".to_string();
            continue;
        }

        repo_guard = Some(guard);
        final_strategy = Some(strategized.strategy);
        break;
    }

    let Some(strategy) = final_strategy else {
        spawn_learn(&ctx, session.id);
        finish(
            &ctx,
            &mut session,
            SessionStatus::Failed,
            format!("exhausted retries with no passing strategy: {last_reason}"),
            false,
        )
        .await;
        return SessionOutcome::Terminal;
    };
    let repo_guard = repo_guard.expect("final_strategy is only set alongside repo_guard");
    let branch = session
        .branch_name
        .clone()
        .expect("a passing strategy always sets branch_name");

    let commit_message = format!("Fix: {}\n\n{}", session.issue.title, strategy.description);
    let commit_hash = match ctx.vcs.commit(&ctx.repo_path, &commit_message).await {
        Ok(hash) => hash,
        Err(error) => {
            let _ = ctx.vcs.rollback(&ctx.repo_path, &branch).await;
            drop(repo_guard);
            finish(&ctx, &mut session, SessionStatus::Failed, format!("commit failed: {error}"), true).await;
            return SessionOutcome::Terminal;
        }
    };
    session.commit_hash = Some(commit_hash);

    if let Err(error) = ctx.vcs.push(&ctx.repo_path, &branch).await {
        let _ = ctx.vcs.rollback(&ctx.repo_path, &branch).await;
        drop(repo_guard);
        finish(&ctx, &mut session, SessionStatus::Failed, format!("push failed: {error}"), true).await;
        return SessionOutcome::Terminal;
    }

    let pr_title = format!("Fix: {}", session.issue.title);
    let pr_body = format!("{}\n\nRollback plan: {}", strategy.description, strategy.rollback_plan);
    let pr = match ctx
        .vcs
        .open_pr(&ctx.repo_path, &branch, &ctx.options.default_branch, &pr_title, &pr_body)
        .await
    {
        Ok(pr) => pr,
        Err(error) => {
            let _ = ctx.vcs.rollback(&ctx.repo_path, &branch).await;
            drop(repo_guard);
            finish(&ctx, &mut session, SessionStatus::Failed, format!("failed to open PR: {error}"), true).await;
            return SessionOutcome::Terminal;
        }
    };
    session.pr_number = Some(u64::from(pr.number));
    session.pr_url = Some(pr.url.clone());
    drop(repo_guard);
    persist(&ctx, &session);

    let ci_ok = run_ci_repair_loop(&ctx, &mut session, &strategy, &branch, pr.number).await;
    session.ci_passed = Some(ci_ok);
    if !ci_ok {
        let guard = ctx.repo_lock.clone().lock_owned().await;
        let _ = ctx.vcs.rollback(&ctx.repo_path, &branch).await;
        drop(guard);
        spawn_learn(&ctx, session.id);
        finish(
            &ctx,
            &mut session,
            SessionStatus::Failed,
            "CI repair loop exhausted its retry budget".to_string(),
            false,
        )
        .await;
        return SessionOutcome::Terminal;
    }

    if ctx.options.auto_deploy_enabled {
        transition(&ctx, &mut session, SessionStatus::Deploying);
        let deploy_guard = ctx.deploy_lock.clone().lock_owned().await;
        let image_ref = format!(
            "{}:{}",
            session.issue.category.as_str(),
            session.commit_hash.clone().unwrap_or_default()
        );
        let deploy_result = ctx.deployer.deploy(&image_ref).await;
        let health_ok = match &deploy_result {
            Ok(()) => match &ctx.options.health_check_url {
                Some(url) => ctx
                    .deployer
                    .health_check(url, ctx.options.deploy_timeout())
                    .await
                    .unwrap_or(false),
                None => true,
            },
            Err(_) => false,
        };
        drop(deploy_guard);

        if deploy_result.is_err() || !health_ok {
            let _ = ctx.deployer.rollback().await;
            let guard = ctx.repo_lock.clone().lock_owned().await;
            let _ = ctx.vcs.rollback(&ctx.repo_path, &branch).await;
            drop(guard);
            spawn_learn(&ctx, session.id);
            finish(
                &ctx,
                &mut session,
                SessionStatus::RolledBack,
                "deploy failed or health check did not pass".to_string(),
                false,
            )
            .await;
            return SessionOutcome::Terminal;
        }
    }

    transition(&ctx, &mut session, SessionStatus::Validating);

    let still_reproduces = match ctx.issue_source.rerun(Some(&session.issue.reporter)).await {
        Ok(candidates) => candidates
            .iter()
            .any(|candidate| crate::similarity::matches_original(&session.issue, candidate)),
        Err(error) => {
            tracing::warn!(%error, "failed to re-run issue source during validation; assuming the fix holds");
            false
        }
    };
    session.validation_passed = Some(!still_reproduces);

    if still_reproduces {
        let guard = ctx.repo_lock.clone().lock_owned().await;
        let _ = ctx.vcs.rollback(&ctx.repo_path, &branch).await;
        drop(guard);
        finish(
            &ctx,
            &mut session,
            SessionStatus::RolledBack,
            "issue still reproduces after the fix".to_string(),
            false,
        )
        .await;
        return SessionOutcome::Terminal;
    }

    if let Err(error) = learning::record_outcome(&ctx.store, session.id, true) {
        tracing::warn!(%error, "failed to record lesson outcome");
    }
    finish(&ctx, &mut session, SessionStatus::Completed, String::new(), false).await;
    SessionOutcome::Terminal
}

/// Polls PR checks until they settle, repairing and re-pushing failures as
/// they appear, up to `max_fix_retries` repair rounds or the configured
/// poll timeout. Returns `true` once every check has passed.
async fn run_ci_repair_loop(
    ctx: &EngineContext,
    session: &mut FixSession,
    strategy: &FixStrategy,
    branch: &str,
    pr_number: u32,
) -> bool {
    let deadline = tokio::time::Instant::now() + ctx.options.ci_poll_timeout();
    let max_attempts = ctx.options.max_fix_retries.max(1);

    loop {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }

        let checks = match ctx.vcs.poll_checks(&ctx.repo_path, pr_number).await {
            Ok(checks) => checks,
            Err(error) => {
                tracing::warn!(%error, "failed to poll CI checks");
                tokio::time::sleep(ctx.options.ci_poll_interval()).await;
                continue;
            }
        };

        match scm::overall_status(&checks) {
            scm::OverallStatus::Success => return true,
            scm::OverallStatus::Pending => {
                tokio::time::sleep(ctx.options.ci_poll_interval()).await;
            }
            scm::OverallStatus::Failure => {
                if session.ci_attempts >= max_attempts {
                    return false;
                }
                session.ci_attempts += 1;

                let mut repaired_any = false;
                for check in checks.iter().filter(|c| c.is_failing()) {
                    let logs = match ctx.vcs.fetch_failed_logs(&ctx.repo_path, pr_number, &check.name).await {
                        Ok(logs) => logs,
                        Err(error) => {
                            tracing::warn!(%error, check = %check.name, "failed to fetch CI logs");
                            continue;
                        }
                    };
                    let failure = scm::classify_failure(&check.name, &logs);
                    session.ci_failures.push(format!("{}: {}", failure.check_name, failure.error_message));
                    record_failure(ctx, session, "ci_repair", &failure.error_message, Some(strategy));

                    match ci_repair::repair(ctx, session, &failure, &strategy.description).await {
                        ci_repair::RepairOutcome::Applied { file } => {
                            tracing::info!(check = %check.name, file, "applied CI repair");
                            repaired_any = true;
                        }
                        ci_repair::RepairOutcome::NoActionableFix(reason) => {
                            tracing::warn!(check = %check.name, reason, "no actionable CI fix produced");
                        }
                    }
                }

                if let Err(error) = learning::analyze_and_learn(&ctx.store, &ctx.llm, session.id).await {
                    tracing::warn!(%error, "failed to analyze CI failures into lessons");
                }

                if !repaired_any {
                    return false;
                }

                let guard = ctx.repo_lock.clone().lock_owned().await;
                let commit_result = ctx.vcs.commit(&ctx.repo_path, "Fix CI failures").await;
                let push_result = if commit_result.is_ok() {
                    ctx.vcs.push(&ctx.repo_path, branch).await
                } else {
                    Ok(())
                };
                drop(guard);

                if commit_result.is_err() || push_result.is_err() {
                    return false;
                }

                tokio::time::sleep(ctx.options.ci_poll_interval()).await;
            }
        }
    }
}

fn transition(ctx: &EngineContext, session: &mut FixSession, status: SessionStatus) {
    let from = session.status.display_name().to_string();
    session.transition(status);
    ctx.notifier.notify(notify::NotifyEvent::StageTransitioned {
        session_id: session.id,
        from,
        to: status.display_name().to_string(),
        timestamp: chrono::Utc::now(),
    });
    persist(ctx, session);
}

fn persist(ctx: &EngineContext, session: &FixSession) {
    if let Err(error) = ctx.store.save_session(session) {
        tracing::warn!(%error, "failed to persist session state");
    }
}

fn notify_started(ctx: &EngineContext, session: &FixSession) {
    ctx.notifier.notify(notify::NotifyEvent::SessionStarted {
        session_id: session.id,
        issue_title: session.issue.title.clone(),
        timestamp: chrono::Utc::now(),
    });
    persist(ctx, session);
}

fn branch_name_for(ctx: &EngineContext, session: &FixSession) -> String {
    format!("{}{}", ctx.options.branch_prefix, session.id)
}

fn record_failure(ctx: &EngineContext, session: &FixSession, stage: &str, error: &str, strategy: Option<&FixStrategy>) {
    let strategy_json = strategy.and_then(|s| serde_json::to_string(s).ok());
    let files: Vec<String> = session.files_modified.iter().cloned().collect();
    if let Err(store_error) = ctx.store.record_failure(
        session.id,
        stage,
        error,
        session.issue.category.as_str(),
        &session.issue.title,
        &files,
        strategy_json.as_deref(),
        None,
    ) {
        tracing::warn!(%store_error, "failed to record failure");
    }
}

/// Spawns `analyze_and_learn` in the background so a slow LLM analysis call
/// never delays a session landing on its terminal status.
fn spawn_learn(ctx: &EngineContext, session_id: uuid::Uuid) {
    let store = ctx.store.clone();
    let llm = ctx.llm.clone();
    tokio::spawn(async move {
        if let Err(error) = learning::analyze_and_learn(&store, &llm, session_id).await {
            tracing::warn!(%error, "failed to analyze failures into lessons");
        }
    });
}

/// Ends a session: records the error (if any), transitions to `status`,
/// persists, optionally spawns a learning pass, and fires the matching
/// terminal notification.
async fn finish(ctx: &EngineContext, session: &mut FixSession, status: SessionStatus, reason: String, learn: bool) {
    if !reason.is_empty() {
        session.error_message = Some(reason.clone());
    }
    transition(ctx, session, status);

    if learn {
        spawn_learn(ctx, session.id);
    }

    let event = match status {
        SessionStatus::Completed => Some(notify::NotifyEvent::SessionCompleted {
            session_id: session.id,
            issue_title: session.issue.title.clone(),
            pr_url: session.pr_url.clone(),
            timestamp: chrono::Utc::now(),
        }),
        SessionStatus::Failed => Some(notify::NotifyEvent::SessionFailed {
            session_id: session.id,
            issue_title: session.issue.title.clone(),
            reason,
            timestamp: chrono::Utc::now(),
        }),
        SessionStatus::RolledBack => Some(notify::NotifyEvent::SessionRolledBack {
            session_id: session.id,
            issue_title: session.issue.title.clone(),
            reason,
            timestamp: chrono::Utc::now(),
        }),
        _ => None,
    };
    if let Some(event) = event {
        ctx.notifier.notify(event);
    }
}
