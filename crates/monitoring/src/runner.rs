//! Batch execution of sensors.
//!
//! The runner resolves each definition to a fresh sensor instance, runs it in
//! its own task under a timeout, and turns every kind of failure into an
//! UNKNOWN result so that one broken sensor never aborts a batch. Completed
//! results go to the cache first and then to the escalation detector.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, info, warn};

use crate::cache::{Flight, ResultCache};
use crate::definition::{DefinitionSource, Lookup, SensorDefinition, SkipReason};
use crate::error::SensorError;
use crate::escalation::EscalationDetector;
use crate::report;
use crate::result::{SensorResult, SensorResultBuilder};
use crate::sensor::SensorRegistry;
use crate::status::SensorStatus;
use crate::threshold;

/// Default upper bound for one sensor execution.
pub const DEFAULT_SENSOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of sensors executed at once in concurrent mode.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Per-batch switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Ignore fresh cache entries and execute anyway.
    pub force: bool,
    /// Attach each sensor's verbose output to its result.
    pub verbose: bool,
    /// Execute independent sensors concurrently.
    pub concurrent: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    pub sensor_timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sensor_timeout: DEFAULT_SENSOR_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// A requested id that produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSensor {
    pub sensor_id: String,
    pub reason: SkipReason,
}

/// Results of a batch in request order, plus requested ids that were skipped.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub results: Vec<SensorResult>,
    pub skipped: Vec<SkippedSensor>,
}

impl BatchOutcome {
    /// Worst status of the batch.
    pub fn status(&self) -> SensorStatus {
        report::aggregate_status(&self.results)
    }

    /// Process exit code for the batch.
    pub fn exit_code(&self) -> i32 {
        self.status().code()
    }
}

/// Executes sensors against the shared cache and escalation state.
pub struct SensorRunner {
    source: Arc<dyn DefinitionSource>,
    registry: Arc<SensorRegistry>,
    cache: Arc<ResultCache>,
    escalation: Arc<EscalationDetector>,
    config: RunnerConfig,
}

impl SensorRunner {
    pub fn new(
        source: Arc<dyn DefinitionSource>,
        registry: Arc<SensorRegistry>,
        cache: Arc<ResultCache>,
        escalation: Arc<EscalationDetector>,
    ) -> Self {
        Self {
            source,
            registry,
            cache,
            escalation,
            config: RunnerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn escalation(&self) -> &Arc<EscalationDetector> {
        &self.escalation
    }

    pub fn source(&self) -> &Arc<dyn DefinitionSource> {
        &self.source
    }

    /// Run the enabled definitions one after another, in order.
    pub async fn run(
        &self,
        definitions: &[SensorDefinition],
        options: RunOptions,
    ) -> Vec<SensorResult> {
        let mut results = Vec::with_capacity(definitions.len());
        for definition in definitions.iter().filter(|d| d.enabled) {
            results.push(self.run_one(definition, options).await);
        }
        results
    }

    /// Run the enabled definitions concurrently. Results keep input order.
    pub async fn run_concurrent(
        &self,
        definitions: &[SensorDefinition],
        options: RunOptions,
    ) -> Vec<SensorResult> {
        stream::iter(definitions.iter().filter(|d| d.enabled))
            .map(|definition| self.run_one(definition, options))
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await
    }

    /// Resolve ids through the definition source and run them. An empty id
    /// list means every enabled sensor.
    pub async fn run_ids(&self, ids: &[String], options: RunOptions) -> BatchOutcome {
        let mut skipped = Vec::new();
        let definitions = if ids.is_empty() {
            self.source.enabled()
        } else {
            let mut found = Vec::with_capacity(ids.len());
            for id in ids {
                match self.source.lookup(id) {
                    Lookup::Found(definition) => found.push(definition),
                    Lookup::Skipped(reason) => {
                        warn!(sensor_id = %id, reason = reason.as_str(), "Skipping requested sensor");
                        skipped.push(SkippedSensor {
                            sensor_id: id.clone(),
                            reason,
                        });
                    }
                }
            }
            found
        };

        let results = if options.concurrent {
            self.run_concurrent(&definitions, options).await
        } else {
            self.run(&definitions, options).await
        };
        BatchOutcome { results, skipped }
    }

    /// Result for one definition, from the cache or a new execution.
    ///
    /// Verbose requests always execute; verbose output is never cached.
    pub async fn run_one(&self, definition: &SensorDefinition, options: RunOptions) -> SensorResult {
        loop {
            if let Some(cached) = self.fresh(definition, options) {
                return cached;
            }

            match self.cache.begin_flight(&definition.id) {
                Flight::Leader(leader) => {
                    // Another leader may have finished between the lookup
                    // and taking the flight.
                    if let Some(cached) = self.fresh(definition, options) {
                        return cached;
                    }
                    let (result, verbose) = self.execute(definition, options.verbose).await;
                    self.cache
                        .put(&definition.id, result.clone(), definition.caching_time);
                    self.escalation.on_result(&result).await;
                    leader.complete(&result);
                    return result.with_verbose(verbose);
                }
                Flight::Follower(follower) => {
                    debug!(sensor_id = %definition.id, "Waiting for in-flight execution");
                    match follower.wait().await {
                        Some(result) if !options.verbose => return result,
                        _ => {}
                    }
                }
            }
        }
    }

    fn fresh(&self, definition: &SensorDefinition, options: RunOptions) -> Option<SensorResult> {
        if options.force || options.verbose {
            return None;
        }
        let cached = self.cache.get(&definition.id, Utc::now())?;
        debug!(sensor_id = %definition.id, "Using cached result");
        Some(cached)
    }

    /// Execute the sensor once. The verbose output is returned beside the
    /// result so that it never reaches the cache.
    async fn execute(
        &self,
        definition: &SensorDefinition,
        verbose: bool,
    ) -> (SensorResult, Option<String>) {
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut sensor = match self.registry.create(definition) {
            Ok(sensor) => sensor,
            Err(e) => return (failed(definition, started_at, clock, &e), None),
        };

        let task_definition = definition.clone();
        let mut builder = SensorResultBuilder::new(&definition.id, started_at);
        let task = tokio::spawn(async move {
            let outcome = sensor.run(&task_definition, &mut builder).await;
            (sensor, builder, outcome)
        });
        // Stops the sensor when it times out or the caller drops this future.
        let _guard = AbortOnDrop(task.abort_handle());

        let (sensor, mut builder, outcome) =
            match tokio::time::timeout(self.config.sensor_timeout, task).await {
                Ok(Ok(finished)) => finished,
                Ok(Err(join_error)) => {
                    return (failed(definition, started_at, clock, &aborted(join_error)), None);
                }
                Err(_) => {
                    let error = SensorError::Timeout(self.config.sensor_timeout);
                    return (failed(definition, started_at, clock, &error), None);
                }
            };

        match outcome {
            Ok(()) => apply_thresholds(definition, &mut builder),
            Err(e) => {
                warn!(sensor_id = %definition.id, error = %e, "Sensor execution failed");
                builder.fail(e.to_string());
            }
        }

        let result = builder.finish(elapsed_ms(clock));
        info!(
            sensor_id = %result.sensor_id,
            status = %result.status,
            elapsed_ms = result.execution_time_ms,
            "Sensor executed"
        );
        let verbose_output = if verbose {
            sensor.verbose_output(&result)
        } else {
            None
        };
        (result, verbose_output)
    }
}

/// Aborts the spawned sensor task when dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl std::fmt::Debug for SensorRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorRunner")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Raise the status from the thresholds when the sensor left it unset.
fn apply_thresholds(definition: &SensorDefinition, builder: &mut SensorResultBuilder) {
    if builder.status().is_some() || !definition.thresholds.is_defined() {
        return;
    }
    let Some(value) = builder.value().and_then(crate::result::SensorValue::as_number) else {
        return;
    };
    let status = threshold::evaluate(value, &definition.thresholds);
    if status == SensorStatus::Ok {
        return;
    }
    builder.set_status(status);
    if let Some(crossing) = threshold::crossing_message(value, &definition.thresholds) {
        let value = crate::result::SensorValue::Number(value);
        builder.add_message(format!("Value {value} {crossing}"));
    }
}

fn failed(
    definition: &SensorDefinition,
    started_at: chrono::DateTime<Utc>,
    clock: Instant,
    error: &SensorError,
) -> SensorResult {
    warn!(sensor_id = %definition.id, error = %error, "Sensor execution failed");
    let mut builder = SensorResultBuilder::new(&definition.id, started_at);
    builder.fail(error.to_string());
    builder.finish(elapsed_ms(clock))
}

fn aborted(error: JoinError) -> SensorError {
    if error.is_cancelled() {
        return SensorError::Aborted("task cancelled".to_string());
    }
    let payload = error.into_panic();
    let reason = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "sensor panicked".to_string());
    SensorError::Aborted(reason)
}

fn elapsed_ms(clock: Instant) -> u64 {
    u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX)
}
