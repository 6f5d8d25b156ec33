//! `failures`: one row per stage-level failure, analyzed asynchronously
//! into lessons.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub id: i64,
    pub session_id: Uuid,
    pub stage: String,
    pub error: String,
    pub category: String,
    pub title: String,
    pub files: Vec<String>,
    pub strategy_json: Option<String>,
    pub context: Option<String>,
    pub analyzed: bool,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Record a stage-level failure and return its id.
    #[allow(clippy::too_many_arguments)]
    pub fn record_failure(
        &self,
        session_id: Uuid,
        stage: &str,
        error: &str,
        category: &str,
        title: &str,
        files: &[String],
        strategy_json: Option<&str>,
        context: Option<&str>,
    ) -> Result<i64, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO failures (session_id, stage, error, category, title, files_json, strategy_json, context, analyzed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
            params![
                session_id.to_string(),
                stage,
                error,
                category,
                title,
                serde_json::to_string(files)?,
                strategy_json,
                context,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Failures for `session_id` not yet analyzed into a lesson.
    pub fn unanalyzed_failures(&self, session_id: Uuid) -> Result<Vec<Failure>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, stage, error, category, title, files_json, strategy_json, context, analyzed, created_at
             FROM failures WHERE session_id = ?1 AND analyzed = 0 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![session_id.to_string()], row_to_failure)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn mark_failure_analyzed(&self, failure_id: i64) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE failures SET analyzed = 1 WHERE id = ?1",
            params![failure_id],
        )?;
        Ok(())
    }

    pub fn failures_for_session(&self, session_id: Uuid) -> Result<Vec<Failure>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, stage, error, category, title, files_json, strategy_json, context, analyzed, created_at
             FROM failures WHERE session_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![session_id.to_string()], row_to_failure)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}

fn row_to_failure(row: &rusqlite::Row<'_>) -> rusqlite::Result<Failure> {
    let session_id: String = row.get(1)?;
    let files_json: String = row.get(6)?;
    let created_at: String = row.get(10)?;
    Ok(Failure {
        id: row.get(0)?,
        session_id: Uuid::parse_str(&session_id).unwrap_or_else(|_| Uuid::nil()),
        stage: row.get(2)?,
        error: row.get(3)?,
        category: row.get(4)?,
        title: row.get(5)?,
        files: serde_json::from_str(&files_json).unwrap_or_default(),
        strategy_json: row.get(7)?,
        context: row.get(8)?,
        analyzed: row.get::<_, i64>(9)? != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_lists_unanalyzed_failures() {
        let store = Store::open_in_memory().unwrap();
        let session_id = Uuid::new_v4();
        let id = store
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

        let unanalyzed = store.unanalyzed_failures(session_id).unwrap();
        assert_eq!(unanalyzed.len(), 1);
        assert_eq!(unanalyzed[0].id, id);

        store.mark_failure_analyzed(id).unwrap();
        assert!(store.unanalyzed_failures(session_id).unwrap().is_empty());
        assert_eq!(store.failures_for_session(session_id).unwrap().len(), 1);
    }
}
