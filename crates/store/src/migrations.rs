//! Versioned schema migrations, applied once each against a fresh or
//! existing database file.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::StoreError;

pub const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        json_blob TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT
     );
     CREATE TABLE IF NOT EXISTS failures (
        id INTEGER PRIMARY KEY,
        session_id TEXT NOT NULL,
        stage TEXT NOT NULL,
        error TEXT NOT NULL,
        category TEXT NOT NULL,
        title TEXT NOT NULL,
        files_json TEXT NOT NULL,
        strategy_json TEXT,
        context TEXT,
        analyzed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
     );
     CREATE INDEX IF NOT EXISTS idx_failures_session ON failures(session_id);
     CREATE TABLE IF NOT EXISTS lessons (
        id INTEGER PRIMARY KEY,
        failure_type TEXT NOT NULL,
        root_cause TEXT NOT NULL,
        lesson TEXT NOT NULL,
        prevention_rule TEXT NOT NULL,
        category TEXT NOT NULL,
        files_json TEXT NOT NULL,
        times_applied INTEGER NOT NULL DEFAULT 0,
        success_count INTEGER NOT NULL DEFAULT 0,
        failure_count INTEGER NOT NULL DEFAULT 0,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
     );
     CREATE UNIQUE INDEX IF NOT EXISTS idx_lessons_prevention_rule ON lessons(prevention_rule);
     CREATE TABLE IF NOT EXISTS lesson_applications (
        id INTEGER PRIMARY KEY,
        lesson_id INTEGER NOT NULL,
        session_id TEXT NOT NULL,
        applied_at TEXT NOT NULL
     );
     CREATE INDEX IF NOT EXISTS idx_lesson_applications_session ON lesson_applications(session_id);
     CREATE TABLE IF NOT EXISTS api_usage (
        id INTEGER PRIMARY KEY,
        session_id TEXT,
        model TEXT NOT NULL,
        input_tokens INTEGER NOT NULL,
        output_tokens INTEGER NOT NULL,
        cost_usd REAL NOT NULL,
        recorded_at TEXT NOT NULL
     );
     CREATE INDEX IF NOT EXISTS idx_api_usage_recorded_at ON api_usage(recorded_at);",
)];

pub fn apply(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
         );",
    )?;

    for (version, sql) in MIGRATIONS {
        let already: i64 = conn.query_row(
            "SELECT COUNT(1) FROM schema_migrations WHERE version = ?1",
            [*version],
            |r| r.get(0),
        )?;
        if already == 0 {
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, Utc::now().to_rfc3339()],
            )?;
        }
    }
    Ok(())
}
