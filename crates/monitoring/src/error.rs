//! Error types for the monitoring engine.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while executing a sensor.
///
/// The runner never propagates these to its caller: they become an UNKNOWN
/// result carrying the error text.
#[derive(Debug, Error)]
pub enum SensorError {
    /// No constructor is registered for the plugin kind
    #[error("No sensor plugin registered for kind '{0}'")]
    UnknownPlugin(String),

    /// A setting is missing or has the wrong shape
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// An external command could not be spawned
    #[error("Failed to execute command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An external command did not finish in time
    #[error("Command timed out after {timeout_secs}s: {command}")]
    CommandTimeout { command: String, timeout_secs: u64 },

    /// The sensor as a whole did not finish in time
    #[error("Sensor execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The sensor task panicked or was cancelled
    #[error("Sensor execution aborted: {0}")]
    Aborted(String),

    /// Collaborator lookup or any other failure
    #[error("{0}")]
    Other(String),
}

impl SensorError {
    pub fn invalid_setting(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Duplicate sensor id '{0}'")]
    DuplicateSensor(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors reading or writing persisted cache/escalation state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path} is corrupt: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type SensorOutcome<T = ()> = Result<T, SensorError>;
