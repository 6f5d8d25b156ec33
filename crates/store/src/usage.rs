//! `api_usage`: append-only ledger of LLM calls, grouped by day for cost
//! tracking.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub session_id: Option<Uuid>,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Store {
    pub fn record_usage(
        &self,
        session_id: Option<Uuid>,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
        cost_usd: f64,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO api_usage (session_id, model, input_tokens, output_tokens, cost_usd, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id.map(|id| id.to_string()),
                model,
                input_tokens,
                output_tokens,
                cost_usd,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Total cost recorded for the given calendar day (UTC).
    pub fn cost_for_date(&self, date: NaiveDate) -> Result<f64, StoreError> {
        let conn = self.lock();
        let start = format!("{date}T00:00:00");
        let end = format!("{date}T23:59:59.999999999");
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(cost_usd), 0.0) FROM api_usage WHERE recorded_at BETWEEN ?1 AND ?2",
            params![start, end],
            |r| r.get(0),
        )?;
        Ok(total)
    }

    pub fn cost_for_session(&self, session_id: Uuid) -> Result<f64, StoreError> {
        let conn = self.lock();
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(cost_usd), 0.0) FROM api_usage WHERE session_id = ?1",
            params![session_id.to_string()],
            |r| r.get(0),
        )?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_cost_for_today() {
        let store = Store::open_in_memory().unwrap();
        store.record_usage(None, "claude-sonnet", 1000, 500, 0.012).unwrap();
        store.record_usage(None, "claude-sonnet", 2000, 1000, 0.024).unwrap();

        let today = Utc::now().date_naive();
        let total = store.cost_for_date(today).unwrap();
        assert!((total - 0.036).abs() < 1e-9);
    }

    #[test]
    fn tracks_cost_per_session() {
        let store = Store::open_in_memory().unwrap();
        let session_id = Uuid::new_v4();
        store.record_usage(Some(session_id), "claude-sonnet", 100, 50, 0.01).unwrap();
        store.record_usage(None, "claude-sonnet", 100, 50, 0.01).unwrap();

        assert!((store.cost_for_session(session_id).unwrap() - 0.01).abs() < 1e-9);
    }
}
