//! Notification system for the fix-session engine.
//!
//! Fire-and-forget event delivery to webhook/logging channels, plus one
//! capability a pure fire-and-forget design can't offer: a blocking
//! **approval round-trip** for the `awaiting_approval` stage.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{Notifier, NotifyEvent};
//!
//! let notifier = Notifier::from_env();
//! notifier.notify(NotifyEvent::SessionStarted {
//!     session_id: uuid::Uuid::new_v4(),
//!     issue_title: "Login button misaligned on mobile".to_string(),
//!     timestamp: chrono::Utc::now(),
//! });
//! ```
//!
//! # Configuration
//!
//! - `SLACK_WEBHOOK_URL`: webhook URL (enables the webhook channel)
//! - `NOTIFY_DISABLED`: set to "true" to disable all notifications

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod approval;
pub mod channels;
pub mod error;
pub mod events;

pub use approval::{ApprovalOutcome, ApprovalRequest};
pub use channels::logging::LoggingChannel;
pub use channels::slack::SlackChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use approval::PendingApprovals;

/// Environment variable to disable all notifications.
const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";

/// Central notification dispatcher.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
    pending: PendingApprovals,
}

impl Notifier {
    /// Create a new notifier from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let disabled = std::env::var(ENV_NOTIFY_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if disabled {
            info!("Notifications disabled via NOTIFY_DISABLED");
            return Self {
                channels: vec![],
                disabled: true,
                pending: PendingApprovals::new(),
            };
        }

        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![Arc::new(LoggingChannel)];

        let slack = SlackChannel::from_env();
        if slack.enabled() {
            info!("webhook notifications enabled");
            channels.push(Arc::new(slack));
        }

        Self {
            channels,
            disabled: false,
            pending: PendingApprovals::new(),
        }
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            disabled: false,
            pending: PendingApprovals::new(),
        }
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            channels: vec![],
            disabled: true,
            pending: PendingApprovals::new(),
        }
    }

    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        if self.disabled {
            0
        } else {
            self.channels.len()
        }
    }

    /// Send a notification to all enabled channels (fire-and-forget).
    pub fn notify(&self, event: NotifyEvent) {
        if self.disabled {
            debug!("Notifications disabled, skipping event");
            return;
        }

        if self.channels.is_empty() {
            debug!("No channels configured, skipping event");
            return;
        }

        let event = Arc::new(event);

        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let event = Arc::clone(&event);

            tokio::spawn(async move {
                let channel_name = channel.name();

                if !channel.enabled() {
                    debug!(channel = channel_name, "Channel disabled, skipping");
                    return;
                }

                match channel.send(&event).await {
                    Ok(()) => {
                        debug!(channel = channel_name, "Notification sent");
                    }
                    Err(e) => {
                        error!(channel = channel_name, error = %e, "Failed to send notification");
                    }
                }
            });
        }
    }

    /// Send a notification and wait for all channels to complete.
    pub async fn notify_and_wait(&self, event: NotifyEvent) -> Vec<(String, Result<(), ChannelError>)> {
        if self.disabled || self.channels.is_empty() {
            return vec![];
        }

        let mut results = vec![];
        for channel in &self.channels {
            let channel_name = channel.name().to_string();
            let result = channel.send(&event).await;
            results.push((channel_name, result));
        }
        results
    }

    /// Sends an [`NotifyEvent::ApprovalRequested`] notification, then
    /// blocks until [`Notifier::resolve_approval`] is called for
    /// `request.id` or `timeout` elapses.
    pub async fn request_approval(&self, request: ApprovalRequest, timeout: Duration) -> ApprovalOutcome {
        self.notify(NotifyEvent::ApprovalRequested {
            session_id: request.session_id,
            reason: request.reason.clone(),
            timestamp: chrono_now(),
        });

        let outcome = self.pending.wait(request.id, timeout).await;
        if outcome == ApprovalOutcome::TimedOut {
            warn!(request_id = %request.id, "approval request timed out");
        }
        outcome
    }

    /// Resolves a pending [`Notifier::request_approval`] call. Returns
    /// `true` if a matching pending request was found.
    pub fn resolve_approval(&self, request_id: uuid::Uuid, approved: bool) -> bool {
        self.pending.resolve(request_id, approved)
    }
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

impl Default for Notifier {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn disabled_notifier_has_no_channels() {
        let notifier = Notifier::disabled();
        assert!(!notifier.has_channels());
        assert_eq!(notifier.channel_count(), 0);
    }

    #[tokio::test]
    async fn approval_round_trip_resolves_when_approved() {
        let notifier = Notifier::with_channels(vec![Arc::new(LoggingChannel)]);
        let request = ApprovalRequest::new(Uuid::new_v4(), "security-sensitive file touched");
        let request_id = request.id;

        let wait = notifier.request_approval(request, Duration::from_secs(5));
        let resolve = async {
            tokio::task::yield_now().await;
            assert!(notifier.resolve_approval(request_id, true));
        };

        let (outcome, ()) = tokio::join!(wait, resolve);
        assert_eq!(outcome, ApprovalOutcome::Approved);
    }

    #[tokio::test]
    async fn approval_times_out_without_a_response() {
        let notifier = Notifier::disabled();
        let request = ApprovalRequest::new(Uuid::new_v4(), "no one is watching");
        let outcome = notifier.request_approval(request, Duration::from_millis(20)).await;
        assert_eq!(outcome, ApprovalOutcome::TimedOut);
    }
}
