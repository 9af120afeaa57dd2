//! Integration tests for the metrics monitor

use async_trait::async_trait;
use lottery_monitor::{
    alerts::Alert,
    config::MonitorConfig,
    error::{NotificationResult, ProbeResult},
    sample::PerformanceMetrics,
    schema::{
        ErrorRecord, PredictionRecord, UserRecord, ALERTS_COLLECTION, ERRORS_COLLECTION,
        PREDICTIONS_COLLECTION, USERS_COLLECTION,
    },
    storage::{read_collection, write_collection},
    AlertKind, CollectionStore, Dependency, DependencyHealth, DependencyProbe, DependencyStatus,
    FileStore, HealthStatus, MemoryStore, MetricSample, MetricsMonitor, MonitorError, Notifier,
    PerformanceSampler, StaticProbe,
};
use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use chrono::{Duration as ChronoDuration, Utc};
use tempfile::TempDir;
use tokio::time::sleep;

const MIB: u64 = 1024 * 1024;

/// Sampler whose memory reading the test controls
#[derive(Default)]
struct FixedSampler {
    memory_bytes: AtomicU64,
}

impl FixedSampler {
    fn with_memory(bytes: u64) -> Arc<Self> {
        let sampler = Arc::new(Self::default());
        sampler.set_memory(bytes);
        sampler
    }

    fn set_memory(&self, bytes: u64) {
        self.memory_bytes.store(bytes, Ordering::SeqCst);
    }
}

impl PerformanceSampler for FixedSampler {
    fn sample(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            load_time_ms: 1000.0,
            memory_usage_bytes: self.memory_bytes.load(Ordering::SeqCst),
            cpu_usage_percent: 0.0,
            network_latency_ms: 0.0,
        }
    }
}

/// Notifier counting what it was asked to show
struct RecordingNotifier {
    granted: bool,
    shown: AtomicUsize,
}

impl Notifier for RecordingNotifier {
    fn permission_granted(&self) -> bool {
        self.granted
    }

    fn notify(&self, _title: &str, _body: &str) -> NotificationResult<()> {
        self.shown.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Test helper wiring a monitor over an in-memory store
fn create_test_monitor(
    sampler: Arc<FixedSampler>,
    probe: StaticProbe,
) -> (MetricsMonitor, Arc<MemoryStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier { granted: true, shown: AtomicUsize::new(0) });

    let monitor = MetricsMonitor::builder(MonitorConfig::default())
        .store(store.clone())
        .probe(Arc::new(probe))
        .sampler(sampler)
        .notifier(notifier.clone())
        .build()
        .expect("Failed to build monitor");

    (monitor, store, notifier)
}

/// Dependency check that never returns
struct PanickingProbe;

#[async_trait]
impl DependencyProbe for PanickingProbe {
    async fn check(&self, dependency: Dependency) -> ProbeResult<DependencyHealth> {
        panic!("{} check crashed", dependency);
    }
}

/// Dependency check that answers online after `delay`
struct SlowProbe {
    delay: Duration,
}

#[async_trait]
impl DependencyProbe for SlowProbe {
    async fn check(&self, _dependency: Dependency) -> ProbeResult<DependencyHealth> {
        sleep(self.delay).await;
        Ok(DependencyHealth::online(self.delay.as_millis() as f64))
    }
}

async fn logged_alerts(store: &MemoryStore) -> Vec<Alert> {
    read_collection(store, ALERTS_COLLECTION).await.unwrap()
}

#[tokio::test]
async fn test_tick_reduces_collections() {
    let (monitor, store, _) =
        create_test_monitor(FixedSampler::with_memory(10 * MIB), StaticProbe::all_online());

    let predictions = vec![
        PredictionRecord { success: true, confidence: 0.8, accuracy: 0.6 },
        PredictionRecord { success: false, confidence: 0.4, accuracy: 0.2 },
    ];
    let users = vec![
        UserRecord { is_active: true, created_at: Some(Utc::now()) },
        UserRecord { is_active: false, created_at: None },
    ];
    let errors = vec![
        ErrorRecord { level: "warning".to_string(), message: "slow draw feed".to_string() },
        ErrorRecord {
            level: "critical".to_string(),
            message: "storage quota exceeded".to_string(),
        },
    ];
    write_collection(store.as_ref(), PREDICTIONS_COLLECTION, &predictions).await.unwrap();
    write_collection(store.as_ref(), USERS_COLLECTION, &users).await.unwrap();
    write_collection(store.as_ref(), ERRORS_COLLECTION, &errors).await.unwrap();

    let sample = monitor.collect_now().await.unwrap();

    assert_eq!(sample.predictions.total, 2);
    assert_eq!(sample.predictions.successful, 1);
    assert_eq!(sample.predictions.failed, 1);
    assert!((sample.predictions.average_confidence - 0.6).abs() < 1e-9);
    assert!((sample.predictions.average_accuracy - 0.4).abs() < 1e-9);
    assert_eq!(sample.users.active, 1);
    assert_eq!(sample.users.total, 2);
    assert_eq!(sample.users.new_today, 1);
    assert_eq!(sample.errors.count, 2);
    assert_eq!(sample.errors.critical_count, 1);
    assert_eq!(sample.errors.last_error_message.as_deref(), Some("storage quota exceeded"));

    // One critical error costs 5 points and 2 errors cost 0.2
    let summary = monitor.get_metrics_summary().unwrap();
    assert!((summary.health - 94.8).abs() < 1e-9);
    assert_eq!(summary.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_high_memory_alert_once_per_breaching_tick() {
    let sampler = FixedSampler::with_memory(200 * MIB);
    let (monitor, store, notifier) =
        create_test_monitor(sampler.clone(), StaticProbe::all_online());

    monitor.collect_now().await.unwrap();
    let alerts = logged_alerts(&store).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::HighMemory);
    assert_eq!(alerts[0].message, "High memory usage: 200.0MB");
    assert_eq!(notifier.shown.load(Ordering::SeqCst), 1);

    sampler.set_memory(10 * MIB);
    monitor.collect_now().await.unwrap();
    assert_eq!(logged_alerts(&store).await.len(), 1);

    sampler.set_memory(150 * MIB);
    monitor.collect_now().await.unwrap();
    let alerts = logged_alerts(&store).await;
    assert_eq!(alerts.iter().filter(|a| a.kind == AlertKind::HighMemory).count(), 2);
    assert_eq!(monitor.stats().alerts_fired, 2);
}

#[tokio::test]
async fn test_offline_dependency_alert() {
    let probe = StaticProbe::all_online()
        .with_health(Dependency::EuroMillions, DependencyHealth::offline(0.0))
        .with_failure(Dependency::Powerball);
    let (monitor, store, _) = create_test_monitor(FixedSampler::with_memory(MIB), probe);

    let sample = monitor.collect_now().await.unwrap();
    assert_eq!(sample.dependencies[&Dependency::Powerball].status, DependencyStatus::Error);
    assert_eq!(sample.dependencies[&Dependency::EuroMillions].status, DependencyStatus::Offline);
    assert_eq!(sample.dependencies[&Dependency::MegaMillions].status, DependencyStatus::Online);

    let offline: Vec<Alert> = logged_alerts(&store)
        .await
        .into_iter()
        .filter(|a| a.kind == AlertKind::DependencyOffline)
        .collect();
    assert_eq!(offline.len(), 2);
}

#[tokio::test]
async fn test_malformed_collection_skips_tick() {
    let (monitor, store, notifier) =
        create_test_monitor(FixedSampler::with_memory(500 * MIB), StaticProbe::all_online());
    store.set_item(PREDICTIONS_COLLECTION, "{not json".to_string()).await.unwrap();

    assert!(monitor.collect_now().await.is_err());
    assert_eq!(monitor.history_len(), 0);
    assert!(monitor.get_metrics_summary().is_none());
    assert!(logged_alerts(&store).await.is_empty());
    assert_eq!(notifier.shown.load(Ordering::SeqCst), 0);

    let stats = monitor.stats();
    assert_eq!(stats.ticks_failed, 1);
    assert_eq!(stats.ticks_completed, 0);

    // The next good tick proceeds normally
    store.remove_item(PREDICTIONS_COLLECTION).await.unwrap();
    assert!(monitor.collect_now().await.is_ok());
    assert_eq!(monitor.history_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_loop_skips_malformed_ticks_then_resumes() {
    let (monitor, store, _) =
        create_test_monitor(FixedSampler::with_memory(MIB), StaticProbe::all_online());
    store.set_item(PREDICTIONS_COLLECTION, "{not json".to_string()).await.unwrap();

    // Ticks at 0 and 100ms both fail
    monitor.start_monitoring(Duration::from_millis(100));
    sleep(Duration::from_millis(150)).await;
    assert!(monitor.is_running());
    assert_eq!(monitor.history_len(), 0);
    assert_eq!(monitor.stats().ticks_failed, 2);
    assert_eq!(monitor.stats().ticks_completed, 0);

    // Ticks at 200 and 300ms succeed
    store.remove_item(PREDICTIONS_COLLECTION).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(monitor.history_len(), 2);
    assert_eq!(monitor.stats().ticks_completed, 2);
    assert_eq!(monitor.stats().ticks_failed, 2);

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cleanup_drops_aged_samples() {
    let (source, _, _) =
        create_test_monitor(FixedSampler::with_memory(MIB), StaticProbe::all_online());
    let base = source.collect_now().await.unwrap();

    let now = Utc::now();
    let aged: Vec<MetricSample> = [8, 6, 0]
        .iter()
        .map(|&days| {
            let mut sample = base.clone();
            sample.timestamp = now - ChronoDuration::days(days);
            sample
        })
        .collect();

    let (monitor, _, _) =
        create_test_monitor(FixedSampler::with_memory(MIB), StaticProbe::all_online());
    let restored = monitor.import_metrics(&serde_json::to_string(&aged).unwrap()).unwrap();
    assert_eq!(restored, 3);

    // Default retention is 7 days
    assert_eq!(monitor.cleanup(), 1);
    assert_eq!(monitor.history_len(), 2);
    assert_eq!(monitor.cleanup(), 0);

    let kept: Vec<MetricSample> = serde_json::from_str(&monitor.export_metrics()).unwrap();
    assert!(kept.iter().all(|s| now - s.timestamp < ChronoDuration::days(7)));
}

#[tokio::test]
async fn test_import_rejects_malformed_export() {
    let (monitor, _, _) =
        create_test_monitor(FixedSampler::with_memory(MIB), StaticProbe::all_online());
    monitor.collect_now().await.unwrap();

    let result = monitor.import_metrics("[{\"timestamp\": 5}]");
    assert!(matches!(result, Err(MonitorError::Serialization(_))));
    assert_eq!(monitor.history_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_reports_crashed_loop() {
    let monitor = MetricsMonitor::builder(MonitorConfig::default())
        .store(Arc::new(MemoryStore::new()))
        .probe(Arc::new(PanickingProbe))
        .sampler(FixedSampler::with_memory(MIB))
        .build()
        .unwrap();

    monitor.start_monitoring(Duration::from_millis(100));
    sleep(Duration::from_millis(50)).await;

    let result = monitor.shutdown().await;
    assert!(matches!(result, Err(MonitorError::Scheduling(_))));
    assert!(!monitor.is_running());
    assert_eq!(monitor.history_len(), 0);

    // The crashed task is gone
    assert!(monitor.shutdown().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_slow_dependency_recorded_as_error() {
    let mut config = MonitorConfig::default();
    config.probes.timeout_ms = 200;

    let monitor = MetricsMonitor::builder(config)
        .store(Arc::new(MemoryStore::new()))
        .probe(Arc::new(SlowProbe { delay: Duration::from_secs(30) }))
        .sampler(FixedSampler::with_memory(MIB))
        .build()
        .unwrap();

    let sample = monitor.collect_now().await.unwrap();
    assert!(sample.dependencies.values().all(|h| h.status == DependencyStatus::Error));
    assert_eq!(monitor.stats().ticks_completed, 1);

    let summary = monitor.get_metrics_summary().unwrap();
    assert!(summary.health < 100.0);
}

#[tokio::test]
async fn test_queries_on_empty_history() {
    let (monitor, _, _) =
        create_test_monitor(FixedSampler::with_memory(MIB), StaticProbe::all_online());

    assert!(monitor.get_metrics_summary().is_none());
    assert!(monitor.get_recent_metrics(24.0).is_empty());
    assert_eq!(monitor.export_metrics(), "[]");

    monitor.collect_now().await.unwrap();
    assert!(monitor.get_recent_metrics(0.0).is_empty());
    assert!(monitor.get_recent_metrics(-1.0).is_empty());
    assert_eq!(monitor.get_recent_metrics(1.0).len(), 1);
    assert_eq!(monitor.get_default_recent_metrics().len(), 1);
}

#[tokio::test]
async fn test_export_is_parseable() {
    let (monitor, _, _) =
        create_test_monitor(FixedSampler::with_memory(MIB), StaticProbe::all_online());
    for _ in 0..3 {
        monitor.collect_now().await.unwrap();
    }

    let exported = monitor.export_metrics();
    let samples: Vec<MetricSample> = serde_json::from_str(&exported).unwrap();
    assert_eq!(samples.len(), 3);
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let raw: serde_json::Value = serde_json::from_str(&exported).unwrap();
    assert!(raw[0]["dependencies"]["megaMillions"]["responseTimeMs"].is_number());
    assert_eq!(raw[0]["dependencies"]["powerball"]["status"], "online");
}

#[tokio::test]
async fn test_history_bounded_by_capacity() {
    let mut config = MonitorConfig::default();
    config.monitoring.history_capacity = 5;

    let monitor = MetricsMonitor::builder(config)
        .store(Arc::new(MemoryStore::new()))
        .probe(Arc::new(StaticProbe::all_online()))
        .sampler(FixedSampler::with_memory(MIB))
        .build()
        .unwrap();

    for _ in 0..8 {
        monitor.collect_now().await.unwrap();
    }
    assert_eq!(monitor.history_len(), 5);
    assert_eq!(monitor.stats().samples_evicted, 3);
    assert_eq!(monitor.cleanup(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_keeps_single_loop() {
    let (monitor, _, _) =
        create_test_monitor(FixedSampler::with_memory(MIB), StaticProbe::all_online());

    monitor.start_monitoring(Duration::from_millis(100));
    monitor.start_monitoring(Duration::from_millis(100));
    assert!(monitor.is_running());

    // Ticks at 0, 100, 200 and 300ms
    sleep(Duration::from_millis(350)).await;
    assert_eq!(monitor.history_len(), 4);

    monitor.stop_monitoring();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(monitor.history_len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let (monitor, _, _) =
        create_test_monitor(FixedSampler::with_memory(MIB), StaticProbe::all_online());

    monitor.stop_monitoring();
    assert!(!monitor.is_running());

    monitor.start_monitoring(Duration::from_millis(50));
    sleep(Duration::from_millis(10)).await;
    monitor.stop_monitoring();
    monitor.stop_monitoring();
    assert!(!monitor.is_running());

    sleep(Duration::from_millis(200)).await;
    assert_eq!(monitor.history_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_loop() {
    let (monitor, _, _) =
        create_test_monitor(FixedSampler::with_memory(MIB), StaticProbe::all_online());

    monitor.start_monitoring(Duration::from_millis(100));
    sleep(Duration::from_millis(150)).await;
    monitor.shutdown().await.unwrap();

    assert!(!monitor.is_running());
    assert_eq!(monitor.stats().ticks_completed, 2);
}

#[tokio::test]
async fn test_file_store_end_to_end() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let mut config = MonitorConfig::default();
    config.storage.base_path = temp_dir.path().join("storage");

    std::fs::create_dir_all(&config.storage.base_path).unwrap();
    std::fs::write(
        config.storage.base_path.join("predictions.json"),
        concat!(
            r#"[{"success": true, "confidence": 0.9, "accuracy": 0.7, "numbers": [1, 2, 3]}, "#,
            r#"{"confidence": "n/a"}]"#,
        ),
    )
    .unwrap();

    let store = Arc::new(FileStore::open(&config.storage.base_path).unwrap());
    let monitor = MetricsMonitor::builder(config)
        .store(store.clone())
        .probe(Arc::new(StaticProbe::all_online()))
        .sampler(FixedSampler::with_memory(300 * MIB))
        .build()
        .unwrap();

    let sample = monitor.collect_now().await.unwrap();
    assert_eq!(sample.predictions.total, 2);
    assert_eq!(sample.predictions.successful, 1);
    assert!((sample.predictions.average_confidence - 0.45).abs() < 1e-9);

    let alerts: Vec<Alert> = read_collection(store.as_ref(), ALERTS_COLLECTION).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert!(temp_dir.path().join("storage").join("alerts.json").exists());
}

#[cfg(feature = "metrics")]
#[tokio::test]
async fn test_prometheus_export() {
    let (monitor, _, _) =
        create_test_monitor(FixedSampler::with_memory(200 * MIB), StaticProbe::all_online());
    monitor.collect_now().await.unwrap();

    let output = monitor.export_prometheus().unwrap();
    assert!(output.contains("lottery_monitor_memory_usage_bytes 209715200"));
    assert!(output.contains("lottery_monitor_alerts_fired_total{type=\"high_memory\"} 1"));
}
