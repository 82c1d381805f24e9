//! Value comparison sensors: report an actual value next to the expected one.
//!
//! The expected value comes from the `value` setting. The sensor does not
//! decide pass/fail itself; it leaves the default OK status (or whatever the
//! thresholds yield) and lets the display highlight mismatches.

use async_trait::async_trait;

use crate::definition::SensorDefinition;
use crate::error::{SensorError, SensorOutcome};
use crate::result::{SensorResultBuilder, SensorValue};
use crate::sensor::Sensor;

/// Plugin kind of the environment variable comparison.
pub const ENV_VALUE_KIND: &str = "env_value";

/// Setting holding the expected value.
const EXPECTED_VALUE_SETTING: &str = "value";

/// Provides the actual value for a comparison sensor.
#[async_trait]
pub trait ValueSource: Send + Sync {
    async fn actual_value(&self, definition: &SensorDefinition) -> SensorOutcome<SensorValue>;
}

/// Sensor comparing a [`ValueSource`] against the configured expected value.
pub struct ValueComparisonSensor<S> {
    source: S,
}

impl<S: ValueSource> ValueComparisonSensor<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: ValueSource> Sensor for ValueComparisonSensor<S> {
    async fn run(
        &mut self,
        definition: &SensorDefinition,
        result: &mut SensorResultBuilder,
    ) -> SensorOutcome {
        let actual = self.source.actual_value(definition).await?;

        if let Some(expected) = definition
            .setting(EXPECTED_VALUE_SETTING)
            .and_then(|setting| actual.coerce_like(setting))
        {
            result.set_expected_value(expected);
        }
        result.set_value(actual);

        Ok(())
    }
}

/// Reads the environment variable named by the `variable` setting.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvValueSource;

#[async_trait]
impl ValueSource for EnvValueSource {
    async fn actual_value(&self, definition: &SensorDefinition) -> SensorOutcome<SensorValue> {
        let name = definition.require_str("variable")?;
        let raw = std::env::var(&name)
            .map_err(|e| SensorError::Other(format!("Environment variable {name}: {e}")))?;
        Ok(match raw.trim() {
            "1" if definition.setting("value").is_some_and(serde_json::Value::is_boolean) => {
                SensorValue::Bool(true)
            }
            "0" if definition.setting("value").is_some_and(serde_json::Value::is_boolean) => {
                SensorValue::Bool(false)
            }
            other => SensorValue::parse(other),
        })
    }
}
