//! Slack webhook notification channel.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Environment variable for Slack webhook URL.
const ENV_SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";

/// Slack webhook notification channel.
pub struct SlackChannel {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl SlackChannel {
    /// Create a new Slack channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let webhook_url = std::env::var(ENV_SLACK_WEBHOOK_URL)
            .ok()
            .filter(|url| !url.trim().is_empty());

        if webhook_url.is_some() {
            debug!("Slack notifications enabled");
        } else {
            debug!("Slack notifications disabled (SLACK_WEBHOOK_URL not set)");
        }

        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Create a Slack channel with a specific webhook URL.
    #[must_use]
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url: Some(webhook_url),
            client: reqwest::Client::new(),
        }
    }

    fn format_payload(event: &NotifyEvent) -> SlackPayload {
        let fields = Self::format_fields(event)
            .into_iter()
            .map(|(title, value)| SlackField {
                title,
                value,
                short: true,
            })
            .collect();

        let attachment = SlackAttachment {
            fallback: event.title(),
            color: event.severity().color().to_string(),
            author_name: Some("Monitoring".to_string()),
            title: event.title(),
            text: Self::format_description(event),
            fields,
            footer: Some(format!(
                "{} | {}",
                event.severity().as_str(),
                event.timestamp().format("%Y-%m-%d %H:%M:%S UTC")
            )),
            ts: Some(event.timestamp().timestamp()),
        };

        SlackPayload {
            attachments: vec![attachment],
        }
    }

    fn format_description(event: &NotifyEvent) -> String {
        match event {
            NotifyEvent::StatusChanged {
                previous_status,
                new_status,
                message,
                ..
            } => {
                if message.is_empty() {
                    format!("Status changed from *{previous_status}* to *{new_status}*")
                } else {
                    format!("Status changed from *{previous_status}* to *{new_status}*\n{message}")
                }
            }
        }
    }

    fn format_fields(event: &NotifyEvent) -> Vec<(String, String)> {
        match event {
            NotifyEvent::StatusChanged {
                sensor_id, value, ..
            } => {
                let mut fields = vec![("Sensor".to_string(), sensor_id.clone())];
                if let Some(value) = value {
                    fields.push(("Value".to_string(), value.clone()));
                }
                fields
            }
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
            .ok_or_else(|| ChannelError::NotConfigured(ENV_SLACK_WEBHOOK_URL.to_string()))?;

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
                "Slack webhook request failed"
            );

            Err(ChannelError::Rejected {
                channel: "slack",
                status: status.as_u16(),
                body,
            })
        }
    }
}

// =============================================================================
// Slack API types
// =============================================================================

#[derive(Debug, Serialize)]
struct SlackPayload {
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    fallback: String,
    color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    author_name: Option<String>,
    title: String,
    text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<SlackField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}
