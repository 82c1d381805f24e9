//! Status-change detection and delivery to the notification sink.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::StateError;
use crate::result::SensorResult;
use crate::state;
use crate::status::SensorStatus;

/// Emitted when a sensor's status differs from the last notified one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscalationEvent {
    pub sensor_id: String,
    pub previous_status: SensorStatus,
    pub new_status: SensorStatus,
    pub result: SensorResult,
}

/// Receives escalation events for rendering and delivery.
#[async_trait]
pub trait EscalationSink: Send + Sync {
    /// Deliver one event. Failures are the sink's to log; they never reach
    /// the runner.
    async fn deliver(&self, event: &EscalationEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl EscalationSink for NullSink {
    async fn deliver(&self, _event: &EscalationEvent) {}
}

/// Tracks the last notified status per sensor.
pub struct EscalationDetector {
    states: DashMap<String, SensorStatus>,
    sink: Arc<dyn EscalationSink>,
}

impl EscalationDetector {
    pub fn new(sink: Arc<dyn EscalationSink>) -> Self {
        Self {
            states: DashMap::new(),
            sink,
        }
    }

    /// Detector without delivery, for callers that only need state.
    pub fn detached() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Seed the last notified status of a sensor.
    #[must_use]
    pub fn with_state(self, sensor_id: impl Into<String>, status: SensorStatus) -> Self {
        self.states.insert(sensor_id.into(), status);
        self
    }

    /// Last notified status; OK when nothing was ever notified.
    pub fn last_notified(&self, sensor_id: &str) -> SensorStatus {
        self.states
            .get(sensor_id)
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// Compare the result against the stored state and deliver an event on
    /// change. Returns the event that was fired, if any.
    pub async fn on_result(&self, result: &SensorResult) -> Option<EscalationEvent> {
        let event = self.transition(result)?;
        info!(
            sensor_id = %event.sensor_id,
            from = %event.previous_status,
            to = %event.new_status,
            "Sensor status changed"
        );
        self.sink.deliver(&event).await;
        Some(event)
    }

    /// Atomic read-modify-write of the stored status. The map guard is
    /// released before anything is delivered.
    fn transition(&self, result: &SensorResult) -> Option<EscalationEvent> {
        let mut state = self
            .states
            .entry(result.sensor_id.clone())
            .or_insert(SensorStatus::Ok);
        let previous = *state;
        if previous == result.status {
            debug!(sensor_id = %result.sensor_id, status = %previous, "Status unchanged");
            return None;
        }
        *state = result.status;
        Some(EscalationEvent {
            sensor_id: result.sensor_id.clone(),
            previous_status: previous,
            new_status: result.status,
            result: result.clone(),
        })
    }

    /// Current state, ordered by sensor id.
    pub fn snapshot(&self) -> BTreeMap<String, SensorStatus> {
        self.states
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn load(path: &Path, sink: Arc<dyn EscalationSink>) -> Result<Self, StateError> {
        let detector = Self::new(sink);
        if let Some(states) = state::load_json::<BTreeMap<String, SensorStatus>>(path)? {
            for (sensor_id, status) in states {
                detector.states.insert(sensor_id, status);
            }
        }
        Ok(detector)
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        state::save_json(path, &self.snapshot())
    }
}

impl std::fmt::Debug for EscalationDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationDetector")
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}
