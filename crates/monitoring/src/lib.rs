//! Sensor-based health monitoring engine.
//!
//! A sensor measures one fact about a system and reduces it to a
//! [`SensorStatus`]. This crate runs sensors, caches their results per TTL,
//! decides when a status change warrants a notification, and renders batches
//! for terminals and alerting pipelines.
//!
//! # Pipeline
//!
//! ```text
//! DefinitionSource ──► SensorRunner ──► SensorRegistry::create ──► Sensor::run
//!                          │                                          │
//!                          ├── ResultCache (TTL + single-flight) ◄────┤
//!                          └── EscalationDetector ──► EscalationSink  │
//!                                                                     ▼
//!                                                   report::{table, json, sensu}
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use monitoring::{
//!     EscalationDetector, MonitoringConfig, ResultCache, RunOptions, SensorRegistry,
//!     SensorRunner, ShellExecutor,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MonitoringConfig::load(None)?;
//! let registry = SensorRegistry::with_builtins(Arc::new(ShellExecutor::default()));
//! let runner = SensorRunner::new(
//!     Arc::new(config.catalog()?),
//!     Arc::new(registry),
//!     Arc::new(ResultCache::default()),
//!     Arc::new(EscalationDetector::detached()),
//! );
//! let batch = runner.run_ids(&[], RunOptions::default()).await;
//! std::process::exit(batch.exit_code());
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod definition;
pub mod error;
pub mod escalation;
pub mod report;
pub mod result;
pub mod runner;
pub mod sensor;
pub mod state;
pub mod status;
pub mod threshold;

pub use cache::{CacheEntry, Flight, ResultCache};
pub use config::{MonitoringConfig, NotifySettings, RunnerSettings};
pub use definition::{DefinitionSource, Lookup, SensorCatalog, SensorDefinition, SkipReason};
pub use error::{ConfigError, SensorError, SensorOutcome, StateError};
pub use escalation::{EscalationDetector, EscalationEvent, EscalationSink, NullSink};
pub use report::SensuOptions;
pub use result::{SensorResult, SensorResultBuilder, SensorValue};
pub use runner::{BatchOutcome, RunOptions, RunnerConfig, SensorRunner, SkippedSensor};
pub use sensor::{
    CommandExecutor, CommandOutput, Sensor, SensorFactory, SensorRegistry, ShellExecutor,
};
pub use status::SensorStatus;
pub use threshold::{ThresholdDirection, Thresholds};
