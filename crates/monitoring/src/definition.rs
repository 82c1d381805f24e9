//! Sensor definitions and the read-only catalog they are served from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, SensorError};
use crate::threshold::Thresholds;

/// Configuration of one sensor. Treated as an immutable snapshot: changes
/// arrive as a new definition replacing the old one in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDefinition {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub plugin_kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds a result stays fresh; 0 disables caching.
    #[serde(default)]
    pub caching_time: u64,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl SensorDefinition {
    pub fn new(id: impl Into<String>, plugin_kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            description: None,
            category: None,
            plugin_kind: plugin_kind.into(),
            enabled: true,
            caching_time: 0,
            thresholds: Thresholds::default(),
            settings: Map::new(),
        }
    }

    #[must_use]
    pub fn with_caching_time(mut self, seconds: u64) -> Self {
        self.caching_time = seconds;
        self
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// String setting; non-string scalars are rendered as text.
    pub fn setting_str(&self, key: &str) -> Option<String> {
        match self.settings.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// String setting that must be present.
    pub fn require_str(&self, key: &str) -> Result<String, SensorError> {
        self.setting_str(key)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SensorError::invalid_setting(key, "missing"))
    }

    /// Boolean setting, accepting `true`/`1`/`"true"` forms. Absent is false.
    pub fn setting_bool(&self, key: &str) -> bool {
        match self.settings.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => matches!(s.trim(), "1" | "true" | "TRUE" | "yes"),
            _ => false,
        }
    }

    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        match self.settings.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Why a requested sensor did not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound,
    Disabled,
}

impl SkipReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::Disabled => "disabled",
        }
    }
}

/// Outcome of resolving a sensor id.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(SensorDefinition),
    Skipped(SkipReason),
}

/// Read-only source of sensor definitions.
pub trait DefinitionSource: Send + Sync {
    fn get(&self, id: &str) -> Option<SensorDefinition>;

    /// Every definition, in catalog order.
    fn all(&self) -> Vec<SensorDefinition>;

    /// Resolve an id to a runnable definition.
    fn lookup(&self, id: &str) -> Lookup {
        match self.get(id) {
            None => Lookup::Skipped(SkipReason::NotFound),
            Some(def) if !def.enabled => Lookup::Skipped(SkipReason::Disabled),
            Some(def) => Lookup::Found(def),
        }
    }

    fn enabled(&self) -> Vec<SensorDefinition> {
        self.all().into_iter().filter(|d| d.enabled).collect()
    }
}

/// In-memory catalog preserving configuration order.
#[derive(Debug, Clone, Default)]
pub struct SensorCatalog {
    definitions: Vec<SensorDefinition>,
}

impl SensorCatalog {
    pub fn new(definitions: Vec<SensorDefinition>) -> Result<Self, ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for def in &definitions {
            if !seen.insert(def.id.as_str()) {
                return Err(ConfigError::DuplicateSensor(def.id.clone()));
            }
        }
        Ok(Self { definitions })
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Replace a definition with a new snapshot, or add it.
    pub fn upsert(&mut self, definition: SensorDefinition) {
        match self.definitions.iter_mut().find(|d| d.id == definition.id) {
            Some(existing) => *existing = definition,
            None => self.definitions.push(definition),
        }
    }
}

impl DefinitionSource for SensorCatalog {
    fn get(&self, id: &str) -> Option<SensorDefinition> {
        self.definitions.iter().find(|d| d.id == id).cloned()
    }

    fn all(&self) -> Vec<SensorDefinition> {
        self.definitions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_reports_missing_and_disabled() {
        let catalog = SensorCatalog::new(vec![
            SensorDefinition::new("a", "env_value"),
            SensorDefinition::new("b", "env_value").disabled(),
        ])
        .unwrap();

        assert!(matches!(catalog.lookup("a"), Lookup::Found(_)));
        assert_eq!(catalog.lookup("b"), Lookup::Skipped(SkipReason::Disabled));
        assert_eq!(catalog.lookup("c"), Lookup::Skipped(SkipReason::NotFound));
        assert_eq!(catalog.enabled().len(), 1);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = SensorCatalog::new(vec![
            SensorDefinition::new("a", "x"),
            SensorDefinition::new("a", "y"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSensor(id) if id == "a"));
    }

    #[test]
    fn test_upsert_replaces_snapshot() {
        let mut catalog = SensorCatalog::new(vec![SensorDefinition::new("a", "x")]).unwrap();
        catalog.upsert(SensorDefinition::new("a", "x").with_caching_time(60));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("a").unwrap().caching_time, 60);
    }

    #[test]
    fn test_setting_accessors() {
        let def = SensorDefinition::new("a", "x")
            .with_setting("flag", "1")
            .with_setting("timeout", 5)
            .with_setting("name", "main");
        assert!(def.setting_bool("flag"));
        assert!(!def.setting_bool("missing"));
        assert_eq!(def.setting_u64("timeout"), Some(5));
        assert_eq!(def.setting_str("name").as_deref(), Some("main"));
        assert!(def.require_str("missing").is_err());
    }
}
