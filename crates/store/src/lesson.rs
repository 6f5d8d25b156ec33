//! `lessons` and `lesson_applications`: derived prevention rules and the
//! sessions they were applied to.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub failure_type: String,
    pub root_cause: String,
    pub lesson: String,
    pub prevention_rule: String,
    pub category: String,
    pub files: Vec<String>,
    pub times_applied: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Lesson {
    /// Laplace-smoothed success rate: unapplied lessons read as 0.5 rather
    /// than 0, so a brand-new lesson isn't ranked last against lessons that
    /// happen to have a couple of recorded failures.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.times_applied == 0 {
            0.5
        } else {
            (self.success_count as f64 + 1.0) / (self.times_applied as f64 + 2.0)
        }
    }
}

impl Store {
    /// Create a lesson, or silently no-op if `prevention_rule` already
    /// exists (first writer wins — dedup is exact string equality).
    pub fn create_lesson(
        &self,
        failure_type: &str,
        root_cause: &str,
        lesson: &str,
        prevention_rule: &str,
        category: &str,
        files: &[String],
    ) -> Result<i64, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO lessons (failure_type, root_cause, lesson, prevention_rule, category, files_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(prevention_rule) DO NOTHING",
            params![
                failure_type,
                root_cause,
                lesson,
                prevention_rule,
                category,
                serde_json::to_string(files)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM lessons WHERE prevention_rule = ?1",
            params![prevention_rule],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    /// Active lessons relevant to `category`/`files`, ordered by
    /// Laplace-smoothed success rate desc, then `times_applied` desc, then
    /// recency desc.
    pub fn relevant_lessons(
        &self,
        category: &str,
        files: &[String],
        limit: usize,
    ) -> Result<Vec<Lesson>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, failure_type, root_cause, lesson, prevention_rule, category, files_json,
                    times_applied, success_count, failure_count, active, created_at
             FROM lessons WHERE active = 1 AND category = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![category], row_to_lesson)?;
        let mut candidates: Vec<Lesson> = rows.collect::<Result<Vec<_>, _>>()?;

        if files.is_empty() {
            // nothing further to filter on
        } else {
            candidates.retain(|l| l.files.is_empty() || l.files.iter().any(|f| files.contains(f)));
        }

        candidates.sort_by(|a, b| {
            b.success_rate()
                .partial_cmp(&a.success_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.times_applied.cmp(&a.times_applied))
                .then(b.created_at.cmp(&a.created_at))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    pub fn record_lesson_application(
        &self,
        lesson_ids: &[i64],
        session_id: Uuid,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        for lesson_id in lesson_ids {
            conn.execute(
                "UPDATE lessons SET times_applied = times_applied + 1 WHERE id = ?1",
                params![lesson_id],
            )?;
            conn.execute(
                "INSERT INTO lesson_applications (lesson_id, session_id, applied_at) VALUES (?1, ?2, ?3)",
                params![lesson_id, session_id.to_string(), now],
            )?;
        }
        Ok(())
    }

    /// Update success/failure counts for every lesson applied to
    /// `session_id`.
    pub fn record_outcome(&self, session_id: Uuid, success: bool) -> Result<(), StoreError> {
        let conn = self.lock();
        let column = if success { "success_count" } else { "failure_count" };
        conn.execute(
            &format!(
                "UPDATE lessons SET {column} = {column} + 1 WHERE id IN
                 (SELECT lesson_id FROM lesson_applications WHERE session_id = ?1)"
            ),
            params![session_id.to_string()],
        )?;
        Ok(())
    }

    /// Deactivate lessons with at least `min_applications` applications and
    /// a success rate below `min_success_rate`.
    pub fn prune_lessons(
        &self,
        min_applications: i64,
        min_success_rate: f64,
    ) -> Result<u32, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, times_applied, success_count FROM lessons WHERE active = 1 AND times_applied >= ?1",
        )?;
        let candidates: Vec<(i64, i64, i64)> = stmt
            .query_map(params![min_applications], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let mut pruned = 0;
        for (id, times_applied, success_count) in candidates {
            let rate = (success_count as f64 + 1.0) / (times_applied as f64 + 2.0);
            if rate < min_success_rate {
                conn.execute("UPDATE lessons SET active = 0 WHERE id = ?1", params![id])?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }
}

fn row_to_lesson(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lesson> {
    let files_json: String = row.get(6)?;
    let created_at: String = row.get(11)?;
    Ok(Lesson {
        id: row.get(0)?,
        failure_type: row.get(1)?,
        root_cause: row.get(2)?,
        lesson: row.get(3)?,
        prevention_rule: row.get(4)?,
        category: row.get(5)?,
        files: serde_json::from_str(&files_json).unwrap_or_default(),
        times_applied: row.get(7)?,
        success_count: row.get(8)?,
        failure_count: row.get(9)?,
        active: row.get::<_, i64>(10)? != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_on_exact_prevention_rule() {
        let store = Store::open_in_memory().unwrap();
        let first = store
            .create_lesson("test", "ambiguous anchor", "include full signature", "rule-a", "ux", &[])
            .unwrap();
        let second = store
            .create_lesson("test", "different root cause text", "ignored", "rule-a", "ux", &[])
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unapplied_lessons_rank_with_smoothed_half_baseline() {
        let store = Store::open_in_memory().unwrap();
        let unapplied = store
            .create_lesson("test", "rc", "l", "rule-unapplied", "ux", &[])
            .unwrap();
        let mediocre = store
            .create_lesson("test", "rc", "l", "rule-mediocre", "ux", &[])
            .unwrap();
        store
            .record_lesson_application(&[mediocre], Uuid::new_v4())
            .unwrap();
        store.record_outcome(Uuid::nil(), false).unwrap(); // no-op, no applications for nil

        let lessons = store.relevant_lessons("ux", &[], 10).unwrap();
        let unapplied_lesson = lessons.iter().find(|l| l.id == unapplied).unwrap();
        assert!((unapplied_lesson.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn prune_deactivates_low_success_lessons() {
        let store = Store::open_in_memory().unwrap();
        let lesson_id = store
            .create_lesson("test", "rc", "l", "rule-bad", "ux", &[])
            .unwrap();
        for _ in 0..5 {
            let session_id = Uuid::new_v4();
            store.record_lesson_application(&[lesson_id], session_id).unwrap();
            store.record_outcome(session_id, false).unwrap();
        }
        let pruned = store.prune_lessons(5, 0.3).unwrap();
        assert_eq!(pruned, 1);
        assert!(store.relevant_lessons("ux", &[], 10).unwrap().is_empty());
    }
}
