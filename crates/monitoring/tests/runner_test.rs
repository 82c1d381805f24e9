//! End-to-end behavior of the runner with the cache and escalation detector.

use async_trait::async_trait;
use monitoring::{
    EscalationDetector, EscalationEvent, EscalationSink, ResultCache, RunOptions, RunnerConfig,
    Sensor, SensorCatalog, SensorDefinition, SensorError, SensorOutcome, SensorRegistry,
    SensorResultBuilder, SensorRunner, SensorStatus, SkipReason, Thresholds,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Counts executions and reports a configurable value after a delay.
struct Probe {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

#[async_trait]
impl Sensor for Probe {
    async fn run(
        &mut self,
        definition: &SensorDefinition,
        result: &mut SensorResultBuilder,
    ) -> SensorOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let value = definition.setting_u64("value").unwrap_or(0);
        result.set_value(value);
        if let Some(status) = definition.setting_str("status") {
            result.set_status(status.parse().map_err(SensorError::Other)?);
        }
        Ok(())
    }

    fn verbose_output(&self, _result: &monitoring::SensorResult) -> Option<String> {
        Some("probe details".to_string())
    }
}

struct Failing;

#[async_trait]
impl Sensor for Failing {
    async fn run(&mut self, _: &SensorDefinition, result: &mut SensorResultBuilder) -> SensorOutcome {
        result.set_value(1_u64);
        Err(SensorError::Other("collaborator lookup failed".to_string()))
    }
}

struct Panicking;

#[async_trait]
impl Sensor for Panicking {
    async fn run(&mut self, _: &SensorDefinition, _: &mut SensorResultBuilder) -> SensorOutcome {
        panic!("sensor exploded");
    }
}

/// Marks completion only after sleeping, so an aborted run never finishes.
struct Lingering {
    finished: Arc<AtomicBool>,
}

#[async_trait]
impl Sensor for Lingering {
    async fn run(&mut self, _: &SensorDefinition, result: &mut SensorResultBuilder) -> SensorOutcome {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.finished.store(true, Ordering::SeqCst);
        result.set_value(1_u64);
        Ok(())
    }
}

/// Records events after a delivery delay.
struct SlowSink {
    delay: Duration,
    events: Mutex<Vec<EscalationEvent>>,
}

#[async_trait]
impl EscalationSink for SlowSink {
    async fn deliver(&self, event: &EscalationEvent) {
        tokio::time::sleep(self.delay).await;
        self.events.lock().unwrap().push(event.clone());
    }
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<EscalationEvent>>);

#[async_trait]
impl EscalationSink for RecordingSink {
    async fn deliver(&self, event: &EscalationEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

struct Harness {
    runner: SensorRunner,
    calls: Arc<AtomicUsize>,
    sink: Arc<RecordingSink>,
}

fn harness(definitions: Vec<SensorDefinition>, delay: Duration) -> Harness {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = SensorRegistry::new();
    let probe_calls = Arc::clone(&calls);
    registry.register("probe", move |_| {
        Ok(Box::new(Probe {
            calls: Arc::clone(&probe_calls),
            delay,
        }))
    });
    registry.register("failing", |_| Ok(Box::new(Failing)));
    registry.register("panicking", |_| Ok(Box::new(Panicking)));

    let sink = Arc::new(RecordingSink::default());
    let runner = SensorRunner::new(
        Arc::new(SensorCatalog::new(definitions).unwrap()),
        Arc::new(registry),
        Arc::new(ResultCache::default()),
        Arc::new(EscalationDetector::new(sink.clone())),
    )
    .with_config(RunnerConfig {
        sensor_timeout: Duration::from_millis(500),
        max_concurrency: 4,
    });

    Harness {
        runner,
        calls,
        sink,
    }
}

fn probe(id: &str) -> SensorDefinition {
    SensorDefinition::new(id, "probe").with_caching_time(3600)
}

#[tokio::test]
async fn test_cached_result_is_returned_unchanged() {
    let h = harness(vec![probe("a")], Duration::ZERO);
    let defs = h.runner.source().all();

    let first = h.runner.run(&defs, RunOptions::default()).await;
    let second = h.runner.run(&defs, RunOptions::default()).await;

    assert_eq!(first, second);
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_force_always_executes() {
    let h = harness(vec![probe("a")], Duration::ZERO);
    let defs = h.runner.source().all();
    let forced = RunOptions {
        force: true,
        ..RunOptions::default()
    };

    h.runner.run(&defs, RunOptions::default()).await;
    h.runner.run(&defs, forced).await;
    h.runner.run(&defs, forced).await;

    assert_eq!(h.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_zero_caching_time_executes_every_time() {
    let h = harness(vec![SensorDefinition::new("a", "probe")], Duration::ZERO);
    let defs = h.runner.source().all();

    h.runner.run(&defs, RunOptions::default()).await;
    h.runner.run(&defs, RunOptions::default()).await;

    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_disabled_sensors_never_returned() {
    let h = harness(vec![probe("a"), probe("b").disabled()], Duration::ZERO);

    let results = h.runner.run(&h.runner.source().all(), RunOptions::default()).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].sensor_id, "a");

    let outcome = h
        .runner
        .run_ids(&["b".to_string()], RunOptions::default())
        .await;
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.skipped[0].reason, SkipReason::Disabled);
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failures_become_unknown_and_batch_continues() {
    let h = harness(
        vec![
            SensorDefinition::new("failing", "failing"),
            SensorDefinition::new("panicking", "panicking"),
            probe("ok"),
        ],
        Duration::ZERO,
    );

    let outcome = h.runner.run_ids(&[], RunOptions::default()).await;
    let statuses: Vec<_> = outcome.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![SensorStatus::Unknown, SensorStatus::Unknown, SensorStatus::Ok]
    );
    assert!(outcome.results[0]
        .message()
        .contains("collaborator lookup failed"));
    assert!(outcome.results[1].message().contains("sensor exploded"));
    assert_eq!(outcome.exit_code(), 3);
}

#[tokio::test]
async fn test_hung_sensor_times_out() {
    let h = harness(vec![probe("slow")], Duration::from_secs(30));

    let started = std::time::Instant::now();
    let results = h.runner.run(&h.runner.source().all(), RunOptions::default()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(results[0].status, SensorStatus::Unknown);
    assert!(results[0].message().contains("timed out"));
}

#[tokio::test]
async fn test_single_flight_under_concurrency() {
    let h = Arc::new(harness(vec![probe("shared")], Duration::from_millis(200)));
    let def = h.runner.source().get("shared").unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let h = Arc::clone(&h);
        let def = def.clone();
        handles.push(tokio::spawn(async move {
            h.runner.run_one(&def, RunOptions::default()).await
        }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(h.sink.0.lock().unwrap().len(), 0, "OK from OK does not escalate");
}

#[tokio::test]
async fn test_concurrent_batch_preserves_order() {
    let defs: Vec<_> = (0..6).map(|i| probe(&format!("s{i}"))).collect();
    let h = harness(defs.clone(), Duration::from_millis(20));

    let results = h.runner.run_concurrent(&defs, RunOptions::default()).await;
    let ids: Vec<_> = results.iter().map(|r| r.sensor_id.as_str()).collect();
    assert_eq!(ids, vec!["s0", "s1", "s2", "s3", "s4", "s5"]);
}

#[tokio::test]
async fn test_thresholds_and_escalation() {
    let def = SensorDefinition::new("queue", "probe")
        .with_thresholds(Thresholds::exceeds(Some(10.0), Some(20.0)))
        .with_setting("value", 25);
    let h = harness(vec![def], Duration::ZERO);
    let defs = h.runner.source().all();

    let results = h.runner.run(&defs, RunOptions::default()).await;
    assert_eq!(results[0].status, SensorStatus::Critical);
    assert_eq!(results[0].message(), "Value 25 exceeds 20");

    // Same status again: no second notification.
    let forced = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    h.runner.run(&defs, forced).await;

    let events = h.sink.0.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].previous_status, SensorStatus::Ok);
    assert_eq!(events[0].new_status, SensorStatus::Critical);
}

#[tokio::test]
async fn test_cache_hit_does_not_escalate() {
    let def = probe("w").with_setting("status", "warning");
    let h = harness(vec![def], Duration::ZERO);
    let defs = h.runner.source().all();

    h.runner.run(&defs, RunOptions::default()).await;
    h.runner.run(&defs, RunOptions::default()).await;

    assert_eq!(h.sink.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_verbose_output_only_when_requested() {
    let h = harness(vec![SensorDefinition::new("a", "probe")], Duration::ZERO);
    let defs = h.runner.source().all();

    let plain = h.runner.run(&defs, RunOptions::default()).await;
    assert_eq!(plain[0].verbose, None);

    let verbose = h
        .runner
        .run(
            &defs,
            RunOptions {
                verbose: true,
                ..RunOptions::default()
            },
        )
        .await;
    assert_eq!(verbose[0].verbose.as_deref(), Some("probe details"));
}

#[tokio::test]
async fn test_verbose_output_is_never_cached() {
    let h = harness(vec![probe("a")], Duration::ZERO);
    let defs = h.runner.source().all();
    let verbose = RunOptions {
        verbose: true,
        ..RunOptions::default()
    };

    let first = h.runner.run(&defs, verbose).await;
    assert_eq!(first[0].verbose.as_deref(), Some("probe details"));
    assert_eq!(h.runner.cache().get("a", chrono::Utc::now()).unwrap().verbose, None);

    let plain = h.runner.run(&defs, RunOptions::default()).await;
    assert_eq!(plain[0].verbose, None);
    assert_eq!(h.calls.load(Ordering::SeqCst), 1, "plain run served from cache");
}

#[tokio::test]
async fn test_verbose_run_after_plain_run_executes() {
    let h = harness(vec![probe("a")], Duration::ZERO);
    let defs = h.runner.source().all();

    h.runner.run(&defs, RunOptions::default()).await;
    let verbose = h
        .runner
        .run(
            &defs,
            RunOptions {
                verbose: true,
                ..RunOptions::default()
            },
        )
        .await;

    assert_eq!(verbose[0].verbose.as_deref(), Some("probe details"));
    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_escalation_delivered_before_waiters_return() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = SensorRegistry::new();
    let probe_calls = Arc::clone(&calls);
    registry.register("probe", move |_| {
        Ok(Box::new(Probe {
            calls: Arc::clone(&probe_calls),
            delay: Duration::from_millis(100),
        }))
    });
    let sink = Arc::new(SlowSink {
        delay: Duration::from_millis(150),
        events: Mutex::new(Vec::new()),
    });
    let def = probe("c").with_setting("status", "critical");
    let runner = Arc::new(SensorRunner::new(
        Arc::new(SensorCatalog::new(vec![def.clone()]).unwrap()),
        Arc::new(registry),
        Arc::new(ResultCache::default()),
        Arc::new(EscalationDetector::new(sink.clone())),
    ));

    let leader = {
        let runner = Arc::clone(&runner);
        let def = def.clone();
        tokio::spawn(async move { runner.run_one(&def, RunOptions::default()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let waited = runner.run_one(&def, RunOptions::default()).await;

    assert_eq!(waited.status, SensorStatus::Critical);
    assert_eq!(sink.events.lock().unwrap().len(), 1);
    assert_eq!(runner.escalation().last_notified("c"), SensorStatus::Critical);
    leader.await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_abandoned_run_stops_the_sensor() {
    let finished = Arc::new(AtomicBool::new(false));
    let mut registry = SensorRegistry::new();
    let flag = Arc::clone(&finished);
    registry.register("lingering", move |_| {
        Ok(Box::new(Lingering {
            finished: Arc::clone(&flag),
        }))
    });
    let def = SensorDefinition::new("l", "lingering");
    let runner = SensorRunner::new(
        Arc::new(SensorCatalog::new(vec![def.clone()]).unwrap()),
        Arc::new(registry),
        Arc::new(ResultCache::default()),
        Arc::new(EscalationDetector::detached()),
    );

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), runner.run_one(&def, RunOptions::default()))
            .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_state_survives_new_runner_instances() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let escalation_path = dir.path().join("escalation.json");
    let def = probe("w").with_setting("status", "critical");

    let first = harness(vec![def.clone()], Duration::ZERO);
    let results = first.runner.run(&[def.clone()], RunOptions::default()).await;
    first.runner.cache().save(&cache_path).unwrap();
    first.runner.escalation().save(&escalation_path).unwrap();
    assert_eq!(first.sink.0.lock().unwrap().len(), 1);

    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = SensorRegistry::new();
    let probe_calls = Arc::clone(&calls);
    registry.register("probe", move |_| {
        Ok(Box::new(Probe {
            calls: Arc::clone(&probe_calls),
            delay: Duration::ZERO,
        }))
    });
    let sink = Arc::new(RecordingSink::default());
    let second = SensorRunner::new(
        Arc::new(SensorCatalog::new(vec![def.clone()]).unwrap()),
        Arc::new(registry),
        Arc::new(ResultCache::load(&cache_path, 10).unwrap()),
        Arc::new(EscalationDetector::load(&escalation_path, sink.clone()).unwrap()),
    );

    let cached = second.run(&[def.clone()], RunOptions::default()).await;
    assert_eq!(cached, results);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let forced = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    second.run(&[def], forced).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(sink.0.lock().unwrap().is_empty(), "already notified CRITICAL");
}
