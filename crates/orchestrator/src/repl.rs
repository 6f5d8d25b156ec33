//! Operator control loop for `serve`: reads commands from stdin and drives
//! the live [`Dispatcher`], the way an admin console would if this
//! workspace grew a network one. Grounded on the teacher's own stdin/stdout
//! streaming idiom (`tokio::io::{AsyncBufReadExt, BufReader}`).

use std::sync::Arc;

use colored::Colorize;
use engine::Dispatcher;
use issues::{Issue, RawIssue};
use notify::Notifier;
use store::Store;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::view;

const HELP: &str = "\
commands:
  submit <title>              submit a new issue with just a title
  status <session_id>         show one session
  list [status]                list sessions, optionally filtered
  pr-status <session_id>       show a session's pull request
  queue-depth                  show the dispatcher's pending queue length
  pause                        stop handing queued issues a concurrency slot
  resume                       undo pause
  cancel <session_id>          abort an in-flight session
  retry <session_id>           resubmit a terminal session's issue
  approve <request_id>         approve a pending approval request
  reject <request_id>          reject a pending approval request
  cost                         show today's spend
  help                         show this message
  quit                         shut down";

pub async fn run(dispatcher: Dispatcher, notifier: Arc<Notifier>, store: Arc<Store>, daily_cost_limit: f64) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return, // stdin closed
            Err(error) => {
                tracing::warn!(%error, "failed to read operator command");
                return;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        match command {
            "help" => println!("{HELP}"),
            "quit" | "exit" => return,
            "submit" if !rest.is_empty() => {
                let issue = Issue::normalize(RawIssue {
                    title: Some(rest.to_string()),
                    ..Default::default()
                });
                let id = dispatcher.submit(issue);
                println!("submitted session {id}");
            }
            "status" => match parse_uuid(rest) {
                Some(id) => match dispatcher.get_session(id) {
                    Some(session) => view::print_session(&session),
                    None => println!("{}", format!("no session {id}").red()),
                },
                None => println!("usage: status <session_id>"),
            },
            "list" => {
                let sessions = dispatcher.list_sessions(None);
                let filtered: Vec<_> = if rest.is_empty() {
                    sessions
                } else {
                    sessions
                        .into_iter()
                        .filter(|s| s.status.display_name().eq_ignore_ascii_case(rest))
                        .collect()
                };
                if filtered.is_empty() {
                    println!("no sessions");
                } else {
                    for session in filtered {
                        println!("{}  {:<18} {}", session.id, session.status.display_name(), session.issue.title);
                    }
                }
            }
            "pr-status" => match parse_uuid(rest) {
                Some(id) => match dispatcher.get_session(id) {
                    Some(session) => match (&session.pr_url, session.pr_number) {
                        (Some(url), Some(number)) => println!("PR #{number}: {url} (ci_passed: {:?})", session.ci_passed),
                        _ => println!("session {id} has not opened a pull request"),
                    },
                    None => println!("{}", format!("no session {id}").red()),
                },
                None => println!("usage: pr-status <session_id>"),
            },
            "queue-depth" => println!("{}", dispatcher.queue_depth()),
            "pause" => {
                dispatcher.pause();
                println!("paused");
            }
            "resume" => {
                dispatcher.resume();
                println!("resumed");
            }
            "cancel" => match parse_uuid(rest) {
                Some(id) => println!("{}", dispatcher.cancel(id).await),
                None => println!("usage: cancel <session_id>"),
            },
            "retry" => match parse_uuid(rest) {
                Some(id) => match dispatcher.retry(id).await {
                    Some(new_id) => println!("retried as {new_id}"),
                    None => println!("{}", "session is unknown or still running".red()),
                },
                None => println!("usage: retry <session_id>"),
            },
            "approve" => match parse_uuid(rest) {
                Some(id) => println!("{}", notifier.resolve_approval(id, true)),
                None => println!("usage: approve <request_id>"),
            },
            "reject" => match parse_uuid(rest) {
                Some(id) => println!("{}", notifier.resolve_approval(id, false)),
                None => println!("usage: reject <request_id>"),
            },
            "cost" => {
                if let Err(error) = view::print_cost(&store, daily_cost_limit) {
                    println!("{}", format!("failed to read cost: {error}").red());
                }
            }
            other => println!("{}", format!("unrecognized command {other:?}; try `help`").red()),
        }
    }
}

fn parse_uuid(text: &str) -> Option<Uuid> {
    Uuid::parse_str(text.trim()).ok()
}
