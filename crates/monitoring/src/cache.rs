//! Per-sensor result cache with single-flight execution.
//!
//! The cache is a TTL-keyed store: it never runs sensors itself. The runner
//! consults it, and uses [`ResultCache::begin_flight`] so that concurrent
//! requests for the same sensor share one execution.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::error::StateError;
use crate::result::SensorResult;
use crate::state;

/// Default number of results kept per sensor for recent-history queries.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// The last result of a sensor and when it goes stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: SensorResult,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(result: SensorResult, ttl_secs: u64) -> Self {
        let expires_at = i64::try_from(ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| result.timestamp.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { result, expires_at }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

type FlightSender = Arc<watch::Sender<Option<SensorResult>>>;
type FlightTable = DashMap<String, FlightSender>;

/// Role of a caller in a single-flight execution.
pub enum Flight {
    /// Nobody is executing this sensor; the caller must run it.
    Leader(FlightLeader),
    /// Another caller is executing it; wait for its result.
    Follower(FlightFollower),
}

/// Held by the caller that executes the sensor. Dropping it without calling
/// [`FlightLeader::complete`] releases waiting followers empty-handed.
pub struct FlightLeader {
    sensor_id: String,
    sender: FlightSender,
    table: Arc<FlightTable>,
}

impl FlightLeader {
    /// Publish the result to every follower.
    pub fn complete(self, result: &SensorResult) {
        self.sender.send_replace(Some(result.clone()));
    }
}

impl Drop for FlightLeader {
    fn drop(&mut self) {
        self.table
            .remove_if(&self.sensor_id, |_, sender| Arc::ptr_eq(sender, &self.sender));
    }
}

/// Waits for an in-flight execution.
pub struct FlightFollower {
    receiver: watch::Receiver<Option<SensorResult>>,
}

impl FlightFollower {
    /// The leader's result, or `None` if the leader was abandoned.
    pub async fn wait(mut self) -> Option<SensorResult> {
        let value = self.receiver.wait_for(Option::is_some).await.ok()?;
        (*value).clone()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheSnapshot {
    #[serde(default)]
    entries: Vec<CacheEntry>,
    #[serde(default)]
    history: BTreeMap<String, Vec<SensorResult>>,
}

/// TTL store of the latest result per sensor id.
#[derive(Debug)]
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    history: DashMap<String, VecDeque<SensorResult>>,
    history_size: usize,
    in_flight: Arc<FlightTable>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl ResultCache {
    pub fn new(history_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            history: DashMap::new(),
            history_size,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Cached result if still fresh at `now`.
    pub fn get(&self, sensor_id: &str, now: DateTime<Utc>) -> Option<SensorResult> {
        let entry = self.entries.get(sensor_id)?;
        if entry.is_fresh(now) {
            Some(entry.result.clone())
        } else {
            None
        }
    }

    /// Store a result, overwriting any previous entry. A TTL of 0 keeps the
    /// result out of the fresh store but still records it in history.
    pub fn put(&self, sensor_id: &str, result: SensorResult, ttl_secs: u64) {
        self.record_history(sensor_id, &result);
        if ttl_secs == 0 {
            self.entries.remove(sensor_id);
            return;
        }
        let entry = CacheEntry::new(result, ttl_secs);
        debug!(sensor_id, expires_at = %entry.expires_at, "Cached sensor result");
        self.entries.insert(sensor_id.to_string(), entry);
    }

    pub fn invalidate(&self, sensor_id: &str) {
        self.entries.remove(sensor_id);
    }

    /// Most recent results for a sensor, newest first.
    pub fn recent(&self, sensor_id: &str, limit: usize) -> Vec<SensorResult> {
        self.history
            .get(sensor_id)
            .map(|h| h.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    fn record_history(&self, sensor_id: &str, result: &SensorResult) {
        if self.history_size == 0 {
            return;
        }
        let mut history = self.history.entry(sensor_id.to_string()).or_default();
        history.push_back(result.clone());
        while history.len() > self.history_size {
            history.pop_front();
        }
    }

    /// Join or start the execution of a sensor.
    pub fn begin_flight(&self, sensor_id: &str) -> Flight {
        match self.in_flight.entry(sensor_id.to_string()) {
            Entry::Occupied(entry) => Flight::Follower(FlightFollower {
                receiver: entry.get().subscribe(),
            }),
            Entry::Vacant(entry) => {
                let (sender, _) = watch::channel(None);
                let sender = Arc::new(sender);
                entry.insert(Arc::clone(&sender));
                Flight::Leader(FlightLeader {
                    sensor_id: sensor_id.to_string(),
                    sender,
                    table: Arc::clone(&self.in_flight),
                })
            }
        }
    }

    /// Load a cache snapshot written by [`ResultCache::save`].
    pub fn load(path: &Path, history_size: usize) -> Result<Self, StateError> {
        let cache = Self::new(history_size);
        if let Some(snapshot) = state::load_json::<CacheSnapshot>(path)? {
            for entry in snapshot.entries {
                cache.entries.insert(entry.result.sensor_id.clone(), entry);
            }
            for (sensor_id, results) in snapshot.history {
                let skip = results.len().saturating_sub(history_size);
                cache
                    .history
                    .insert(sensor_id, results.into_iter().skip(skip).collect());
            }
        }
        Ok(cache)
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let mut entries: Vec<CacheEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.result.sensor_id.cmp(&b.result.sensor_id));
        let history = self
            .history
            .iter()
            .map(|e| (e.key().clone(), e.value().iter().cloned().collect()))
            .collect();
        state::save_json(path, &CacheSnapshot { entries, history })
    }
}
