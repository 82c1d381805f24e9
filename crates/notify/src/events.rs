//! Notification event types for sensor monitoring.

use chrono::{DateTime, Utc};
use monitoring::{EscalationEvent, SensorStatus};
use serde::{Deserialize, Serialize};

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
    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }

    /// Attachment color for chat channels.
    #[must_use]
    pub const fn color(&self) -> &'static str {
        match self {
            Self::Info => "#2ecc71",
            Self::Warning => "#f39c12",
            Self::Critical => "#e74c3c",
        }
    }
}

impl From<SensorStatus> for Severity {
    fn from(status: SensorStatus) -> Self {
        match status {
            SensorStatus::Ok | SensorStatus::Info => Self::Info,
            SensorStatus::Warning => Self::Warning,
            SensorStatus::Critical | SensorStatus::Unknown => Self::Critical,
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    /// A sensor's status differs from the last notified one
    StatusChanged {
        sensor_id: String,
        previous_status: SensorStatus,
        new_status: SensorStatus,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Get a short title for this event type.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::StatusChanged {
                sensor_id,
                new_status,
                ..
            } => format!("{new_status}: {sensor_id}"),
        }
    }

    /// Get the severity for this event.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::StatusChanged { new_status, .. } => Severity::from(*new_status),
        }
    }

    /// Status the event is about.
    #[must_use]
    pub const fn status(&self) -> SensorStatus {
        match self {
            Self::StatusChanged { new_status, .. } => *new_status,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::StatusChanged { timestamp, .. } => *timestamp,
        }
    }
}

impl From<&EscalationEvent> for NotifyEvent {
    fn from(event: &EscalationEvent) -> Self {
        Self::StatusChanged {
            sensor_id: event.sensor_id.clone(),
            previous_status: event.previous_status,
            new_status: event.new_status,
            message: event.result.message(),
            value: event.result.value.as_ref().map(ToString::to_string),
            timestamp: event.result.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitoring::SensorResultBuilder;

    #[test]
    fn test_from_escalation_event() {
        let mut builder = SensorResultBuilder::new("git_dirty_tree", Utc::now());
        builder
            .critical()
            .set_value(3_u64)
            .add_message("Files in unexpected state: M a, M b");
        let result = builder.finish(12);
        let escalation = EscalationEvent {
            sensor_id: "git_dirty_tree".to_string(),
            previous_status: SensorStatus::Ok,
            new_status: SensorStatus::Critical,
            result: result.clone(),
        };

        let event = NotifyEvent::from(&escalation);
        assert_eq!(event.title(), "CRITICAL: git_dirty_tree");
        assert_eq!(event.severity(), Severity::Critical);
        assert_eq!(event.timestamp(), result.timestamp);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["value"], "3");
        assert_eq!(json["previous_status"], "OK");
    }

    #[test]
    fn test_unknown_maps_to_critical_severity() {
        assert_eq!(Severity::from(SensorStatus::Unknown), Severity::Critical);
        assert_eq!(Severity::from(SensorStatus::Info), Severity::Info);
    }
}
