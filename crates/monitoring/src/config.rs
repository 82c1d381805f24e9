//! Configuration file for the monitoring runner.
//!
//! **File locations** (checked in order):
//! 1. explicit path (`--config`)
//! 2. `MONITORING_CONFIG` environment variable
//! 3. `monitoring.toml` in the current directory
//!
//! An explicitly named file must exist. When nothing is found the defaults
//! apply and no sensors are defined.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_HISTORY_SIZE;
use crate::definition::{SensorCatalog, SensorDefinition};
use crate::error::ConfigError;
use crate::runner::{RunnerConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_SENSOR_TIMEOUT};
use crate::status::SensorStatus;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MONITORING_CONFIG";

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "monitoring.toml";

const CACHE_STATE_FILE: &str = "cache.json";
const ESCALATION_STATE_FILE: &str = "escalation.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Seconds a single sensor may run.
    pub sensor_timeout: u64,
    pub max_concurrency: usize,
    /// Results kept per sensor for history queries.
    pub history_size: usize,
    /// Directory for cache and escalation state.
    pub state_dir: PathBuf,
    /// Shell used by command sensors.
    pub shell: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            sensor_timeout: DEFAULT_SENSOR_TIMEOUT.as_secs(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            history_size: DEFAULT_HISTORY_SIZE,
            state_dir: PathBuf::from(".monitoring"),
            shell: "sh".to_string(),
        }
    }
}

impl RunnerSettings {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            sensor_timeout: Duration::from_secs(self.sensor_timeout),
            max_concurrency: self.max_concurrency,
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.state_dir.join(CACHE_STATE_FILE)
    }

    pub fn escalation_path(&self) -> PathBuf {
        self.state_dir.join(ESCALATION_STATE_FILE)
    }
}

/// Which escalations are delivered to notification channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub severities: Vec<SensorStatus>,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            severities: vec![
                SensorStatus::Critical,
                SensorStatus::Warning,
                SensorStatus::Unknown,
            ],
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub runner: RunnerSettings,
    #[serde(default)]
    pub notify: NotifySettings,
    #[serde(default)]
    pub sensors: Vec<SensorDefinition>,
}

impl MonitoringConfig {
    /// Load from the standard locations.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            tracing::info!("Loading monitoring config from {}={}", CONFIG_ENV, path);
            return Self::load_from_path(Path::new(&path));
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load_from_path(local);
        }

        tracing::info!("No monitoring config found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), sensors = config.sensors.len(), "Loaded monitoring config");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "runner.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.runner.sensor_timeout == 0 {
            return Err(ConfigError::Invalid(
                "runner.sensor_timeout must be at least 1 second".to_string(),
            ));
        }
        if let Some(sensor) = self.sensors.iter().find(|s| s.id.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "sensor of kind '{}' has an empty id",
                sensor.plugin_kind
            )));
        }
        Ok(())
    }

    /// Catalog of the configured sensors.
    pub fn catalog(&self) -> Result<SensorCatalog, ConfigError> {
        SensorCatalog::new(self.sensors.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DefinitionSource;
    use crate::threshold::ThresholdDirection;
    use serial_test::serial;

    const SAMPLE: &str = r#"
[runner]
sensor_timeout = 30
state_dir = "/var/lib/monitoring"

[notify]
severities = ["CRITICAL"]

[[sensors]]
id = "git_dirty_tree"
label = "Git working tree"
plugin_kind = "git_dirty_tree"
caching_time = 3600
settings = { repo_path = ".", check_branch = true, expected_branch = "main" }

[[sensors]]
id = "disk_free"
plugin_kind = "env_value"
enabled = false
thresholds = { warning = 20, critical = 10, type = "falls" }
settings = { variable = "DISK_FREE" }
"#;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("monitoring.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_sample() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitoringConfig::load(Some(&write_config(dir.path(), SAMPLE))).unwrap();

        assert_eq!(config.runner.sensor_timeout, 30);
        assert_eq!(config.runner.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(
            config.runner.cache_path(),
            PathBuf::from("/var/lib/monitoring/cache.json")
        );
        assert_eq!(config.notify.severities, vec![SensorStatus::Critical]);

        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 2);
        let git = catalog.get("git_dirty_tree").unwrap();
        assert_eq!(git.label(), "Git working tree");
        assert_eq!(git.caching_time, 3600);
        assert!(git.setting_bool("check_branch"));

        let disk = catalog.get("disk_free").unwrap();
        assert!(!disk.enabled);
        assert_eq!(disk.thresholds.direction, ThresholdDirection::Falls);
        assert_eq!(disk.thresholds.critical, Some(10.0));
        assert_eq!(catalog.enabled().len(), 1);
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: MonitoringConfig = toml::from_str("").unwrap();
        assert_eq!(config, MonitoringConfig::default());
        assert_eq!(config.runner.shell, "sh");
        assert!(config.notify.severities.contains(&SensorStatus::Unknown));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let config: MonitoringConfig = toml::from_str(
            r#"
[[sensors]]
id = "a"
plugin_kind = "env_value"

[[sensors]]
id = "a"
plugin_kind = "env_value"
"#,
        )
        .unwrap();
        assert!(matches!(config.catalog(), Err(ConfigError::DuplicateSensor(id)) if id == "a"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[runner]\nmax_concurrency = 0\n");
        assert!(matches!(
            MonitoringConfig::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[[sensors]\n");
        let err = MonitoringConfig::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("monitoring.toml"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = MonitoringConfig::load(Some(Path::new("/nonexistent/monitoring.toml")));
        assert!(matches!(err, Err(ConfigError::Read { .. })));
    }

    #[test]
    #[serial]
    fn test_env_var_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), SAMPLE);
        std::env::set_var(CONFIG_ENV, &path);
        let config = MonitoringConfig::load(None);
        std::env::remove_var(CONFIG_ENV);
        assert_eq!(config.unwrap().sensors.len(), 2);
    }
}
