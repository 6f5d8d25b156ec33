//! Notification event types for the fix-session engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for alerts and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Warning - something needs attention
    Warning,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// Get the webhook embed/attachment color for this severity.
    #[must_use]
    pub const fn color(&self) -> u32 {
        match self {
            Self::Info => 0x0034_98db,     // Blue
            Self::Warning => 0x00f3_9c12,  // Orange
            Self::Critical => 0x00e7_4c3c, // Red
        }
    }

    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }
}

/// Events that can trigger notifications over the course of a fix session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    /// A new fix session has started working an issue.
    SessionStarted {
        session_id: Uuid,
        issue_title: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A session moved from one stage to the next.
    StageTransitioned {
        session_id: Uuid,
        from: String,
        to: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The approval gate tripped; a human needs to approve before the
    /// session can continue.
    ApprovalRequested {
        session_id: Uuid,
        reason: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The day's LLM spend crossed the warning threshold.
    BudgetWarning {
        today_cost_usd: f64,
        daily_limit_usd: f64,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A session reached a successful terminal state.
    SessionCompleted {
        session_id: Uuid,
        issue_title: String,
        pr_url: Option<String>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A session reached the `Failed` terminal state.
    SessionFailed {
        session_id: Uuid,
        issue_title: String,
        reason: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A session reached the `RolledBack` terminal state.
    SessionRolledBack {
        session_id: Uuid,
        issue_title: String,
        reason: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Get a short title for this event type.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::SessionStarted { session_id, .. } => format!("Fix Session Started: {session_id}"),
            Self::StageTransitioned { session_id, to, .. } => format!("Session {session_id} -> {to}"),
            Self::ApprovalRequested { session_id, .. } => format!("Approval Needed: {session_id}"),
            Self::BudgetWarning { .. } => "Daily LLM Budget Warning".to_string(),
            Self::SessionCompleted { session_id, .. } => format!("Fix Session Completed: {session_id}"),
            Self::SessionFailed { session_id, .. } => format!("Fix Session Failed: {session_id}"),
            Self::SessionRolledBack { session_id, .. } => format!("Fix Session Rolled Back: {session_id}"),
        }
    }

    /// Get the severity/color for this event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::SessionStarted { .. } | Self::StageTransitioned { .. } | Self::SessionCompleted { .. } => {
                Severity::Info
            }
            Self::ApprovalRequested { .. } | Self::BudgetWarning { .. } | Self::SessionRolledBack { .. } => {
                Severity::Warning
            }
            Self::SessionFailed { .. } => Severity::Critical,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::SessionStarted { timestamp, .. }
            | Self::StageTransitioned { timestamp, .. }
            | Self::ApprovalRequested { timestamp, .. }
            | Self::BudgetWarning { timestamp, .. }
            | Self::SessionCompleted { timestamp, .. }
            | Self::SessionFailed { timestamp, .. }
            | Self::SessionRolledBack { timestamp, .. } => *timestamp,
        }
    }

    /// A one-or-two-line human description, independent of title/severity.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::SessionStarted { issue_title, .. } => format!("Working on: {issue_title}"),
            Self::StageTransitioned { from, to, .. } => format!("{from} -> {to}"),
            Self::ApprovalRequested { reason, .. } => reason.clone(),
            Self::BudgetWarning {
                today_cost_usd,
                daily_limit_usd,
                ..
            } => format!("Spent ${today_cost_usd:.2} of ${daily_limit_usd:.2} daily budget"),
            Self::SessionCompleted { issue_title, pr_url, .. } => match pr_url {
                Some(url) => format!("{issue_title}\nPR: {url}"),
                None => issue_title.clone(),
            },
            Self::SessionFailed { issue_title, reason, .. } => format!("{issue_title}\n{reason}"),
            Self::SessionRolledBack { issue_title, reason, .. } => format!("{issue_title}\n{reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_colors_are_stable() {
        assert_eq!(Severity::Info.color(), 0x0034_98db);
        assert_eq!(Severity::Warning.color(), 0x00f3_9c12);
        assert_eq!(Severity::Critical.color(), 0x00e7_4c3c);
    }

    #[test]
    fn session_failed_is_critical() {
        let event = NotifyEvent::SessionFailed {
            session_id: Uuid::nil(),
            issue_title: "x".to_string(),
            reason: "y".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.severity(), Severity::Critical);
    }

    #[test]
    fn titles_include_session_id() {
        let id = Uuid::nil();
        let event = NotifyEvent::SessionStarted {
            session_id: id,
            issue_title: "flaky test".to_string(),
            timestamp: Utc::now(),
        };
        assert!(event.title().contains(&id.to_string()));
    }
}
