//! CRUD over the `sessions` table: one JSON snapshot per session id,
//! overwritten on every status transition.

use rusqlite::params;
use uuid::Uuid;

use crate::{FixSession, SessionStatus, Store, StoreError};

impl Store {
    /// Persist the current state of `session`, replacing any prior snapshot.
    pub fn save_session(&self, session: &FixSession) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO sessions (id, json_blob, status, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id.to_string(),
                serde_json::to_string(session)?,
                session.status.display_name(),
                session.started_at.to_rfc3339(),
                session.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn load_session(&self, id: Uuid) -> Result<Option<FixSession>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT json_blob FROM sessions WHERE id = ?1")?;
        let mut rows = stmt.query(params![id.to_string()])?;
        if let Some(row) = rows.next()? {
            let blob: String = row.get(0)?;
            return Ok(Some(serde_json::from_str(&blob)?));
        }
        Ok(None)
    }

    /// All sessions, optionally narrowed to one status, most recently
    /// started first.
    pub fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<FixSession>, StoreError> {
        let conn = self.lock();
        let mut out = Vec::new();
        let blobs: Vec<String> = if let Some(status) = status {
            let mut stmt = conn.prepare(
                "SELECT json_blob FROM sessions WHERE status = ?1 ORDER BY started_at DESC",
            )?;
            let rows = stmt.query_map(params![status.display_name()], |r| r.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        } else {
            let mut stmt =
                conn.prepare("SELECT json_blob FROM sessions ORDER BY started_at DESC")?;
            let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        for blob in blobs {
            out.push(serde_json::from_str(&blob)?);
        }
        Ok(out)
    }

    /// Count of sessions in a non-terminal, non-queued state — the
    /// dispatcher's concurrency accounting.
    pub fn count_in_flight(&self) -> Result<u32, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM sessions
             WHERE status NOT IN ('queued', 'completed', 'failed', 'rolled_back', 'blocked')",
            [],
            |r| r.get(0),
        )?;
        Ok(count.max(0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use issues::{Issue, RawIssue};

    #[test]
    fn round_trips_a_session() {
        let store = Store::open_in_memory().unwrap();
        let session = FixSession::new(Issue::normalize(RawIssue::default()));
        store.save_session(&session).unwrap();

        let loaded = store.load_session(session.id).unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.status, SessionStatus::Queued);
    }

    #[test]
    fn list_sessions_filters_by_status() {
        let store = Store::open_in_memory().unwrap();
        let mut queued = FixSession::new(Issue::normalize(RawIssue::default()));
        let mut done = FixSession::new(Issue::normalize(RawIssue::default()));
        done.transition(SessionStatus::Completed);
        store.save_session(&queued).unwrap();
        store.save_session(&done).unwrap();

        let completed = store.list_sessions(Some(SessionStatus::Completed)).unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, done.id);

        queued.transition(SessionStatus::Analyzing);
        store.save_session(&queued).unwrap();
        assert_eq!(store.count_in_flight().unwrap(), 1);
    }

    #[test]
    fn missing_session_returns_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_session(Uuid::new_v4()).unwrap().is_none());
    }
}
