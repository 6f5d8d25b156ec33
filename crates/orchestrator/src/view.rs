//! Read-only session/cost inspection, shared by the one-shot CLI
//! subcommands and the `serve` REPL.

use anyhow::Result;
use colored::Colorize;
use store::{FixSession, SessionStatus, Store};
use uuid::Uuid;

fn parse_status(raw: &str) -> Option<SessionStatus> {
    let normalized = raw.to_lowercase().replace('-', "_");
    [
        SessionStatus::Queued,
        SessionStatus::Analyzing,
        SessionStatus::Strategizing,
        SessionStatus::AwaitingApproval,
        SessionStatus::Implementing,
        SessionStatus::Testing,
        SessionStatus::Deploying,
        SessionStatus::Validating,
        SessionStatus::Completed,
        SessionStatus::Failed,
        SessionStatus::RolledBack,
        SessionStatus::Blocked,
    ]
    .into_iter()
    .find(|status| status.display_name() == normalized)
}

pub fn print_session(session: &FixSession) {
    println!("{} {}", "session".bold(), session.id);
    println!("  status:       {}", session.status.display_name());
    println!("  issue:        {}", session.issue.title);
    println!("  started_at:   {}", session.started_at);
    if let Some(completed) = session.completed_at {
        println!("  completed_at: {completed}");
    }
    if let Some(branch) = &session.branch_name {
        println!("  branch:       {branch}");
    }
    if let Some(pr_url) = &session.pr_url {
        println!("  pr:           {pr_url} (#{})", session.pr_number.unwrap_or_default());
    }
    if let Some(error) = &session.error_message {
        println!("  {} {error}", "error:".red());
    }
    println!("  tokens_used:  {}", session.tokens_used);
    println!("  cost:         ${:.4}", session.accumulated_cost);
}

pub fn print_status(store: &Store, session_id: Uuid) -> Result<()> {
    match store.load_session(session_id)? {
        Some(session) => {
            print_session(&session);
            Ok(())
        }
        None => {
            println!("{}", format!("no session {session_id}").red());
            Ok(())
        }
    }
}

pub fn print_pr_status(store: &Store, session_id: Uuid) -> Result<()> {
    match store.load_session(session_id)? {
        Some(session) => {
            match (&session.pr_url, session.pr_number) {
                (Some(url), Some(number)) => println!("PR #{number}: {url} (ci_passed: {:?})", session.ci_passed),
                _ => println!("session {session_id} has not opened a pull request"),
            }
            Ok(())
        }
        None => {
            println!("{}", format!("no session {session_id}").red());
            Ok(())
        }
    }
}

pub fn print_list(store: &Store, status: Option<&str>) -> Result<()> {
    let filter = status.and_then(parse_status);
    if status.is_some() && filter.is_none() {
        println!("{}", format!("unrecognized status {:?}", status.unwrap()).red());
        return Ok(());
    }

    let sessions = store.list_sessions(filter)?;
    if sessions.is_empty() {
        println!("no sessions");
        return Ok(());
    }
    for session in sessions {
        println!(
            "{}  {:<18} {}",
            session.id,
            session.status.display_name(),
            session.issue.title
        );
    }
    Ok(())
}

pub fn print_cost(store: &Store, daily_limit: f64) -> Result<()> {
    let today = chrono::Utc::now().date_naive();
    let spent = store.cost_for_date(today)?;
    println!("today's spend: ${spent:.4} / ${daily_limit:.2}");
    Ok(())
}
