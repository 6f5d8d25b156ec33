//! Persistence for fix sessions, recorded failures, derived lessons, and
//! API usage, backed by a single SQLite database file per orchestrator
//! instance.

mod migrations;

pub mod failure;
pub mod lesson;
pub mod session;
pub mod usage;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use issues::{FixStrategy, Issue};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use failure::Failure;
pub use lesson::Lesson;
pub use usage::UsageRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid id: {0}")]
    InvalidId(#[from] uuid::Error),
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
}

/// The fix-session state machine's states, in the order a healthy session
/// passes through them. `awaiting_approval` and `deploying` may be skipped;
/// `strategizing`..`testing` may repeat up to `max_fix_retries` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Queued,
    Analyzing,
    Strategizing,
    AwaitingApproval,
    Implementing,
    Testing,
    Deploying,
    Validating,
    Completed,
    Failed,
    RolledBack,
    Blocked,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::RolledBack | Self::Blocked
        )
    }

    /// The state this session would move to next along the happy path,
    /// skipping the optional `awaiting_approval`/`deploying` stages. Callers
    /// that need to skip them explicitly pass the status they landed on
    /// instead of relying on this helper.
    #[must_use]
    pub fn next_default(self) -> Option<Self> {
        match self {
            Self::Queued => Some(Self::Analyzing),
            Self::Analyzing => Some(Self::Strategizing),
            Self::Strategizing => Some(Self::AwaitingApproval),
            Self::AwaitingApproval => Some(Self::Implementing),
            Self::Implementing => Some(Self::Testing),
            Self::Testing => Some(Self::Deploying),
            Self::Deploying => Some(Self::Validating),
            Self::Validating => Some(Self::Completed),
            Self::Completed | Self::Failed | Self::RolledBack | Self::Blocked => None,
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Analyzing => "analyzing",
            Self::Strategizing => "strategizing",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Implementing => "implementing",
            Self::Testing => "testing",
            Self::Deploying => "deploying",
            Self::Validating => "validating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::Blocked => "blocked",
        }
    }
}

/// Mutable per-attempt record of a single issue being fixed. Persisted to
/// `store` after every status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixSession {
    pub id: Uuid,
    pub issue: Issue,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub thread_id: String,
    pub strategy: Option<FixStrategy>,
    pub branch_name: Option<String>,
    pub pr_url: Option<String>,
    pub pr_number: Option<u64>,
    pub files_modified: BTreeSet<String>,
    pub commit_hash: Option<String>,
    pub validation_passed: Option<bool>,
    pub error_message: Option<String>,
    /// Attempts of the strategize->test cycle, tracked separately from
    /// `ci_attempts` even though both share the `max_fix_retries` budget.
    pub strategy_attempts: u32,
    pub ci_attempts: u32,
    pub ci_passed: Option<bool>,
    pub ci_failures: Vec<String>,
    pub tokens_used: u64,
    pub accumulated_cost: f64,
    pub applied_lesson_ids: Vec<i64>,
}

impl FixSession {
    #[must_use]
    pub fn new(issue: Issue) -> Self {
        Self {
            id: Uuid::new_v4(),
            issue,
            status: SessionStatus::Queued,
            started_at: Utc::now(),
            completed_at: None,
            thread_id: Uuid::new_v4().to_string(),
            strategy: None,
            branch_name: None,
            pr_url: None,
            pr_number: None,
            files_modified: BTreeSet::new(),
            commit_hash: None,
            validation_passed: None,
            error_message: None,
            strategy_attempts: 0,
            ci_attempts: 0,
            ci_passed: None,
            ci_failures: Vec::new(),
            tokens_used: 0,
            accumulated_cost: 0.0,
            applied_lesson_ids: Vec::new(),
        }
    }

    /// Move to `status`, enforcing the `completed_at` invariant: set iff
    /// the destination is terminal.
    pub fn transition(&mut self, status: SessionStatus) {
        self.status = status;
        self.completed_at = if status.is_terminal() {
            Some(Utc::now())
        } else {
            None
        };
    }
}

/// Embedded-SQLite-backed store for sessions, failures, lessons, and API
/// usage. A single `Mutex<Connection>` serializes writers, matching
/// SQLite's own single-writer semantics.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        migrations::apply(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        migrations::apply(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use issues::RawIssue;

    #[test]
    fn new_session_starts_queued_with_no_completed_at() {
        let session = FixSession::new(Issue::normalize(RawIssue::default()));
        assert_eq!(session.status, SessionStatus::Queued);
        assert!(session.completed_at.is_none());
    }

    #[test]
    fn transition_to_terminal_sets_completed_at() {
        let mut session = FixSession::new(Issue::normalize(RawIssue::default()));
        session.transition(SessionStatus::Completed);
        assert!(session.completed_at.is_some());
        session.transition(SessionStatus::Testing);
        assert!(session.completed_at.is_none());
    }

    #[test]
    fn opens_in_memory_store_and_applies_migrations() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(1) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
