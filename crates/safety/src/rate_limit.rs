//! Per-operation sliding one-hour-window rate limiting, generalized from a
//! fixed single-bucket limiter to a config-driven per-operation cap table.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Window {
    count: u32,
    window_start: DateTime<Utc>,
}

/// Tracks request counts per operation key over a sliding one-hour window.
pub struct RateLimiter {
    caps: HashMap<String, u32>,
    windows: Arc<RwLock<HashMap<String, Window>>>,
    last_cleanup: Arc<RwLock<DateTime<Utc>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(caps: HashMap<String, u32>) -> Self {
        Self {
            caps,
            windows: Arc::new(RwLock::new(HashMap::new())),
            last_cleanup: Arc::new(RwLock::new(Utc::now())),
        }
    }

    fn cap_for(&self, operation: &str) -> u32 {
        self.caps.get(operation).copied().unwrap_or(10)
    }

    /// `true` if one more event for `operation` is admissible right now.
    pub async fn check(&self, operation: &str) -> bool {
        let mut windows = self.windows.write().await;
        self.cleanup_if_due(&mut windows).await;
        let cap = self.cap_for(operation);
        let now = Utc::now();
        match windows.get(operation) {
            Some(w) if now - w.window_start < Duration::hours(1) => w.count < cap,
            _ => true,
        }
    }

    /// Record one event for `operation`, rolling the window over if it has
    /// expired.
    pub async fn record(&self, operation: &str) {
        let mut windows = self.windows.write().await;
        let now = Utc::now();
        let entry = windows.entry(operation.to_string()).or_insert(Window {
            count: 0,
            window_start: now,
        });
        if now - entry.window_start >= Duration::hours(1) {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.count += 1;
    }

    /// Remaining capacity for `operation` in the current window.
    pub async fn remaining(&self, operation: &str) -> u32 {
        let windows = self.windows.read().await;
        let cap = self.cap_for(operation);
        match windows.get(operation) {
            Some(w) if Utc::now() - w.window_start < Duration::hours(1) => cap.saturating_sub(w.count),
            _ => cap,
        }
    }

    /// Seconds until `operation`'s window resets, or zero if it is not
    /// currently over the cap.
    pub async fn wait_time(&self, operation: &str) -> i64 {
        let windows = self.windows.read().await;
        let cap = self.cap_for(operation);
        if let Some(w) = windows.get(operation) {
            if w.count >= cap {
                let reset_at = w.window_start + Duration::hours(1);
                return (reset_at - Utc::now()).num_seconds().max(0);
            }
        }
        0
    }

    async fn cleanup_if_due(&self, windows: &mut HashMap<String, Window>) {
        let mut last_cleanup = self.last_cleanup.write().await;
        let now = Utc::now();
        if now - *last_cleanup < Duration::minutes(5) {
            return;
        }
        windows.retain(|_, w| now - w.window_start < Duration::hours(1));
        *last_cleanup = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_the_configured_cap() {
        let mut caps = HashMap::new();
        caps.insert("llm_query".to_string(), 2);
        let limiter = RateLimiter::new(caps);

        assert!(limiter.check("llm_query").await);
        limiter.record("llm_query").await;
        assert!(limiter.check("llm_query").await);
        limiter.record("llm_query").await;
        assert!(!limiter.check("llm_query").await);
    }

    #[tokio::test]
    async fn unconfigured_operation_uses_default_cap() {
        let limiter = RateLimiter::new(HashMap::new());
        assert_eq!(limiter.remaining("unknown_op").await, 10);
    }
}
