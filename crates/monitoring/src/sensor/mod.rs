//! Sensor contract and the registration table of built-in variants.
//!
//! A sensor is constructed fresh for every execution from its definition, so
//! it may keep per-run state (such as captured command output) for
//! [`Sensor::verbose_output`].
//!
//! # Built-in kinds
//! - `git_dirty_tree`: repository cleanliness via shell commands
//! - `env_value`: value comparison against an environment variable

pub mod git_dirty_tree;
pub mod shell;
pub mod value_comparison;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::definition::SensorDefinition;
use crate::error::{SensorError, SensorOutcome};
use crate::result::{SensorResult, SensorResultBuilder};

pub use git_dirty_tree::GitDirtyTreeSensor;
pub use shell::{CommandExecutor, CommandOutput, ShellExecutor};
pub use value_comparison::{EnvValueSource, ValueComparisonSensor, ValueSource};

/// Unit of measurement producing one result per execution.
#[async_trait]
pub trait Sensor: Send + Sync {
    /// Measure and record value, status and messages on `result`.
    ///
    /// Leaving the status unset means OK unless the definition's thresholds
    /// say otherwise. Returning an error turns the run into UNKNOWN.
    async fn run(
        &mut self,
        definition: &SensorDefinition,
        result: &mut SensorResultBuilder,
    ) -> SensorOutcome;

    /// Diagnostic detail for operators; never used for the status decision.
    fn verbose_output(&self, _result: &SensorResult) -> Option<String> {
        None
    }
}

/// Constructor stored in the registry.
pub type SensorFactory =
    Arc<dyn Fn(&SensorDefinition) -> SensorOutcome<Box<dyn Sensor>> + Send + Sync>;

/// Table mapping a plugin kind to the constructor of its sensor.
#[derive(Clone, Default)]
pub struct SensorRegistry {
    factories: HashMap<String, SensorFactory>,
}

impl SensorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in sensor kinds, sharing one command executor.
    pub fn with_builtins(executor: Arc<dyn CommandExecutor>) -> Self {
        let mut registry = Self::new();
        registry.register(git_dirty_tree::KIND, move |_| {
            Ok(Box::new(GitDirtyTreeSensor::new(Arc::clone(&executor))))
        });
        registry.register(value_comparison::ENV_VALUE_KIND, |_| {
            Ok(Box::new(ValueComparisonSensor::new(EnvValueSource)))
        });
        registry
    }

    /// Register (or replace) the constructor for a kind.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&SensorDefinition) -> SensorOutcome<Box<dyn Sensor>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        tracing::debug!(kind = %kind, "Registering sensor plugin");
        self.factories.insert(kind, Arc::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Instantiate the sensor for a definition.
    pub fn create(&self, definition: &SensorDefinition) -> SensorOutcome<Box<dyn Sensor>> {
        let factory = self
            .factories
            .get(&definition.plugin_kind)
            .ok_or_else(|| SensorError::UnknownPlugin(definition.plugin_kind.clone()))?;
        factory(definition)
    }
}

impl std::fmt::Debug for SensorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
