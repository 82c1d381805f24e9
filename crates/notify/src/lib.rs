//! Notification delivery for sensor status changes.
//!
//! This crate turns escalation events from the monitoring engine into
//! chat notifications. [`Notifier`] implements
//! [`monitoring::EscalationSink`], so it plugs straight into the
//! escalation detector.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use monitoring::{EscalationDetector, SensorStatus};
//! use notify::Notifier;
//!
//! let notifier = Notifier::from_env().with_severities(vec![SensorStatus::Critical]);
//! let detector = EscalationDetector::new(Arc::new(notifier));
//! ```
//!
//! # Configuration
//!
//! The notifier is configured via environment variables:
//!
//! - `SLACK_WEBHOOK_URL`: Slack webhook URL (enables Slack channel)
//! - `NOTIFY_DISABLED`: Set to "true" to disable all notifications
//!
//! Which statuses are delivered comes from the `[notify]` section of the
//! monitoring config. An escalation to any other status is still recorded by
//! the detector, it is just not sent.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;

pub use channels::slack::SlackChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity};

use async_trait::async_trait;
use monitoring::{EscalationEvent, EscalationSink, SensorStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable to disable all notifications.
const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";

/// Central notification dispatcher.
///
/// The `Notifier` manages multiple notification channels and dispatches
/// events to all enabled channels, waiting for each delivery.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    severities: Vec<SensorStatus>,
    disabled: bool,
}

impl Notifier {
    /// Create a new notifier from environment variables.
    ///
    /// This will auto-detect which channels are configured based on
    /// environment variables and enable them accordingly.
    #[must_use]
    pub fn from_env() -> Self {
        let disabled = std::env::var(ENV_NOTIFY_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if disabled {
            info!("Notifications disabled via NOTIFY_DISABLED");
            return Self::disabled();
        }

        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

        let slack = SlackChannel::from_env();
        if slack.enabled() {
            info!("Slack notifications enabled");
            channels.push(Arc::new(slack));
        }

        if channels.is_empty() {
            debug!("No notification channels configured");
        } else {
            info!(
                channel_count = channels.len(),
                "Notification system initialized"
            );
        }

        Self::with_channels(channels)
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            severities: SensorStatus::ALL.to_vec(),
            disabled: false,
        }
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            severities: vec![],
            disabled: true,
        }
    }

    /// Restrict delivery to escalations into these statuses.
    #[must_use]
    pub fn with_severities(mut self, severities: Vec<SensorStatus>) -> Self {
        self.severities = severities;
        self
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    /// Get the number of enabled channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        if self.disabled {
            0
        } else {
            self.channels.len()
        }
    }

    /// Whether an escalation into `status` is delivered.
    #[must_use]
    pub fn delivers(&self, status: SensorStatus) -> bool {
        self.has_channels() && self.severities.contains(&status)
    }

    /// Send a notification and wait for all channels to complete.
    ///
    /// Channels are tried in order; every outcome is collected.
    pub async fn notify_and_wait(
        &self,
        event: &NotifyEvent,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        if !self.has_channels() {
            return vec![];
        }

        let mut results = vec![];

        for channel in self.channels.iter().filter(|c| c.enabled()) {
            let channel_name = channel.name().to_string();
            let result = channel.send(event).await;
            results.push((channel_name, result));
        }

        results
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::from_env()
    }
}

#[async_trait]
impl EscalationSink for Notifier {
    async fn deliver(&self, event: &EscalationEvent) {
        if !self.delivers(event.new_status) {
            debug!(
                sensor_id = %event.sensor_id,
                status = %event.new_status,
                "Escalation not configured for delivery"
            );
            return;
        }

        let notification = NotifyEvent::from(event);
        for (channel, result) in self.notify_and_wait(&notification).await {
            match result {
                Ok(()) => debug!(channel = %channel, sensor_id = %event.sensor_id, "Notification sent"),
                Err(e) => warn!(
                    channel = %channel,
                    sensor_id = %event.sensor_id,
                    error = %e,
                    "Failed to send notification"
                ),
            }
        }
    }
}
