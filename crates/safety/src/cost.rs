//! Daily cost budget tracking, backed by the `store` crate's `api_usage`
//! ledger.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use store::Store;
use uuid::Uuid;

use crate::SafetyError;

/// Tracks API spend against a daily budget and fires a one-time-per-day
/// warning once 80% of the budget is consumed.
pub struct CostTracker {
    store: Arc<Store>,
    daily_limit: f64,
    warned_on: Mutex<Option<NaiveDate>>,
}

impl CostTracker {
    #[must_use]
    pub fn new(store: Arc<Store>, daily_limit: f64) -> Self {
        Self {
            store,
            daily_limit,
            warned_on: Mutex::new(None),
        }
    }

    /// Record a completed LLM call's usage and cost.
    pub fn record_usage(
        &self,
        session_id: Option<Uuid>,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
        cost_usd: f64,
    ) -> Result<(), SafetyError> {
        self.store
            .record_usage(session_id, model, input_tokens, output_tokens, cost_usd)?;
        Ok(())
    }

    pub fn today_cost(&self) -> Result<f64, SafetyError> {
        Ok(self.store.cost_for_date(Utc::now().date_naive())?)
    }

    pub fn remaining(&self) -> Result<f64, SafetyError> {
        Ok((self.daily_limit - self.today_cost()?).max(0.0))
    }

    /// `true` unless today's spend has already reached the daily limit.
    pub fn can_proceed(&self) -> Result<bool, SafetyError> {
        Ok(self.today_cost()? < self.daily_limit)
    }

    /// Returns a warning message the first time today's spend crosses 80%
    /// of the daily limit; `None` on every subsequent call for the same
    /// day.
    pub fn check_budget_warning(&self) -> Result<Option<String>, SafetyError> {
        let today_cost = self.today_cost()?;
        if today_cost < self.daily_limit * 0.8 {
            return Ok(None);
        }
        let today = Utc::now().date_naive();
        let mut warned_on = self.warned_on.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *warned_on == Some(today) {
            return Ok(None);
        }
        *warned_on = Some(today);
        Ok(Some(format!(
            "Daily cost {today_cost:.2} has reached {:.0}% of the {:.2} budget",
            (today_cost / self.daily_limit) * 100.0,
            self.daily_limit
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_proceed_until_limit_reached() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let tracker = CostTracker::new(store, 1.0);
        tracker.record_usage(None, "claude-sonnet", 1000, 500, 0.5).unwrap();
        assert!(tracker.can_proceed().unwrap());
        tracker.record_usage(None, "claude-sonnet", 1000, 500, 0.6).unwrap();
        assert!(!tracker.can_proceed().unwrap());
    }

    #[test]
    fn warns_once_per_day_past_eighty_percent() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let tracker = CostTracker::new(store, 1.0);
        tracker.record_usage(None, "claude-sonnet", 1000, 500, 0.85).unwrap();

        assert!(tracker.check_budget_warning().unwrap().is_some());
        assert!(tracker.check_budget_warning().unwrap().is_none());
    }
}
