//! Sensor results and the builder a sensor fills in during its run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::status::SensorStatus;

/// Value measured by a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SensorValue {
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// Convert a JSON setting into a value, keeping its natural type.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Parse free text, preferring booleans, then numbers.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" => return Self::Bool(true),
            "false" | "no" => return Self::Bool(false),
            _ => {}
        }
        trimmed
            .parse::<f64>()
            .map_or_else(|_| Self::Text(trimmed.to_string()), Self::Number)
    }

    /// Coerce a JSON setting into the same type family as `self`.
    ///
    /// Used to read an expected value so it compares like-for-like with the
    /// actual one. Returns `None` if the setting can't be represented.
    #[must_use]
    pub fn coerce_like(&self, setting: &serde_json::Value) -> Option<Self> {
        match (self, setting) {
            (Self::Bool(_), serde_json::Value::Bool(b)) => Some(Self::Bool(*b)),
            (Self::Bool(_), serde_json::Value::Number(n)) => {
                n.as_f64().map(|n| Self::Bool(n != 0.0))
            }
            (Self::Bool(_), serde_json::Value::String(s)) => match s.trim() {
                "1" => Some(Self::Bool(true)),
                "0" => Some(Self::Bool(false)),
                other => match Self::parse(other) {
                    v @ Self::Bool(_) => Some(v),
                    _ => None,
                },
            },
            (Self::Number(_), serde_json::Value::String(s)) => {
                s.trim().parse().ok().map(Self::Number)
            }
            (Self::Text(_), serde_json::Value::Number(n)) => Some(Self::Text(n.to_string())),
            (Self::Text(_), serde_json::Value::Bool(b)) => Some(Self::Text(b.to_string())),
            _ => Self::from_json(setting),
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for SensorValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for SensorValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u64> for SensorValue {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for SensorValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for SensorValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SensorValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Outcome of one sensor execution. Never mutated after it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorResult {
    pub sensor_id: String,
    /// When the execution started.
    pub timestamp: DateTime<Utc>,
    pub execution_time_ms: u64,
    pub status: SensorStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SensorValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<SensorValue>,
    #[serde(default)]
    pub messages: Vec<String>,
    /// Diagnostic detail, only present when verbose output was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<String>,
}

impl SensorResult {
    /// Human readable summary of the run.
    pub fn message(&self) -> String {
        if !self.messages.is_empty() {
            return self.messages.join(", ");
        }
        match (&self.value, &self.expected_value) {
            (Some(value), Some(expected)) => format!("Value {value}, expected {expected}"),
            (Some(value), None) => format!("Value {value}"),
            _ => String::new(),
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.value.as_ref().is_some_and(SensorValue::is_numeric)
    }

    /// Attach verbose output. Only used before the result is published.
    #[must_use]
    pub fn with_verbose(mut self, verbose: Option<String>) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Mutable result shell handed to a sensor during its run.
#[derive(Debug, Clone)]
pub struct SensorResultBuilder {
    sensor_id: String,
    timestamp: DateTime<Utc>,
    status: Option<SensorStatus>,
    value: Option<SensorValue>,
    expected_value: Option<SensorValue>,
    messages: Vec<String>,
}

impl SensorResultBuilder {
    pub fn new(sensor_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            status: None,
            value: None,
            expected_value: None,
            messages: Vec::new(),
        }
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Status explicitly set so far, if any.
    pub fn status(&self) -> Option<SensorStatus> {
        self.status
    }

    pub fn value(&self) -> Option<&SensorValue> {
        self.value.as_ref()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Overwrite the status unconditionally.
    pub fn set_status(&mut self, status: SensorStatus) -> &mut Self {
        self.status = Some(status);
        self
    }

    /// Raise to CRITICAL. Nothing downgrades it afterwards.
    pub fn critical(&mut self) -> &mut Self {
        self.status = Some(SensorStatus::Critical);
        self
    }

    /// Raise to WARNING unless the run is already CRITICAL.
    pub fn warning(&mut self) -> &mut Self {
        if self.status != Some(SensorStatus::Critical) {
            self.status = Some(SensorStatus::Warning);
        }
        self
    }

    pub fn set_value(&mut self, value: impl Into<SensorValue>) -> &mut Self {
        self.value = Some(value.into());
        self
    }

    pub fn set_expected_value(&mut self, value: impl Into<SensorValue>) -> &mut Self {
        self.expected_value = Some(value.into());
        self
    }

    pub fn add_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.messages.push(message.into());
        self
    }

    /// Mark the run as failed: UNKNOWN plus the failure description.
    pub fn fail(&mut self, message: impl Into<String>) -> &mut Self {
        self.status = Some(SensorStatus::Unknown);
        self.messages.push(message.into());
        self
    }

    /// Freeze into an immutable result. An unset status becomes OK.
    pub fn finish(self, execution_time_ms: u64) -> SensorResult {
        SensorResult {
            sensor_id: self.sensor_id,
            timestamp: self.timestamp,
            execution_time_ms,
            status: self.status.unwrap_or_default(),
            value: self.value,
            expected_value: self.expected_value,
            messages: self.messages,
            verbose: None,
        }
    }
}
