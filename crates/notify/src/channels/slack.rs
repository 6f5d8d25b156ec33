//! Generic webhook notification channel. Posts a Slack-attachment-shaped
//! body, which Slack-compatible webhook receivers (Slack itself, many
//! Mattermost/Discord-via-bridge setups) render directly.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::events::{NotifyEvent, Severity};
use crate::NotifyChannel;

/// Environment variable for the webhook URL.
const ENV_SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";

/// Webhook notification channel.
pub struct SlackChannel {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl SlackChannel {
    /// Create a new channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let webhook_url = std::env::var(ENV_SLACK_WEBHOOK_URL).ok();

        if webhook_url.is_some() {
            debug!("webhook notifications enabled");
        } else {
            debug!("webhook notifications disabled (SLACK_WEBHOOK_URL not set)");
        }

        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Create a channel with a specific webhook URL.
    #[must_use]
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url: Some(webhook_url),
            client: reqwest::Client::new(),
        }
    }

    /// Format an event as a webhook payload.
    fn format_payload(event: &NotifyEvent) -> WebhookPayload {
        let color = match event.severity() {
            Severity::Info => "#3498db",
            Severity::Warning => "#f39c12",
            Severity::Critical => "#e74c3c",
        };

        let attachment = WebhookAttachment {
            fallback: event.title(),
            color: color.to_string(),
            title: event.title(),
            text: event.description(),
            footer: Some(format!(
                "{} | {}",
                event.severity().as_str(),
                event.timestamp().format("%Y-%m-%d %H:%M:%S UTC")
            )),
            ts: Some(event.timestamp().timestamp()),
        };

        WebhookPayload {
            attachments: vec![attachment],
        }
    }
}

#[async_trait]
impl NotifyChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let webhook_url = self
            .webhook_url
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured("SLACK_WEBHOOK_URL".to_string()))?;

        let payload = Self::format_payload(event);

        debug!(channel = "slack", event_type = ?event.title(), "Sending notification");

        let response = self.client.post(webhook_url).json(&payload).send().await?;

        if response.status().is_success() {
            debug!(channel = "slack", "Notification sent successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            warn!(
                channel = "slack",
                status = %status,
                body = %body,
                "webhook request failed"
            );

            Err(ChannelError::Other(format!("webhook returned {status}: {body}")))
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    attachments: Vec<WebhookAttachment>,
}

#[derive(Debug, Serialize)]
struct WebhookAttachment {
    fallback: String,
    color: String,
    title: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn disabled_without_webhook_url() {
        std::env::remove_var(ENV_SLACK_WEBHOOK_URL);
        let channel = SlackChannel::from_env();
        assert!(!channel.enabled());
    }

    #[test]
    fn formats_payload_with_severity_color() {
        let event = NotifyEvent::SessionFailed {
            session_id: Uuid::nil(),
            issue_title: "x".to_string(),
            reason: "y".to_string(),
            timestamp: Utc::now(),
        };
        let payload = SlackChannel::format_payload(&event);
        assert_eq!(payload.attachments[0].color, "#e74c3c");
    }
}
