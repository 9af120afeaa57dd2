//! The metrics monitor
//!
//! [`MetricsMonitor`] owns the sample history and drives the sampling loop.
//! The host creates exactly one and keeps it for the life of the process;
//! there is no global instance.
//!
//! A tick reads performance counters, reduces the local collections, probes
//! the dependencies, stores the complete sample and fires alerts. A tick that
//! fails before its sample is complete stores nothing; the loop carries on
//! with the next tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alerts::{self, LogNotifier, Notifier};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::health::health_score;
use crate::history::{MetricsHistory, MetricsSummary};
#[cfg(feature = "metrics")]
use crate::metrics::MonitorMetrics;
use crate::performance::{PerformanceHints, PerformanceSampler, ProcessSampler};
use crate::probe::{self, probe_all, DependencyProbe};
use crate::sample::{ErrorStats, MetricSample, PredictionStats, UserStats};
use crate::schema::{
    ErrorRecord, PredictionRecord, UserRecord, ERRORS_COLLECTION, PREDICTIONS_COLLECTION,
    USERS_COLLECTION,
};
use crate::storage::{read_collection, CollectionStore, FileStore};

/// Counters describing the monitor's own activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub ticks_completed: u64,
    pub ticks_failed: u64,
    pub alerts_fired: u64,
    pub samples_evicted: u64,
}

#[derive(Default)]
struct StatCounters {
    ticks_completed: AtomicU64,
    ticks_failed: AtomicU64,
    alerts_fired: AtomicU64,
    samples_evicted: AtomicU64,
}

/// State shared between the monitor handle and its sampling task
struct MonitorCore {
    config: MonitorConfig,
    store: Arc<dyn CollectionStore>,
    probe: Arc<dyn DependencyProbe>,
    sampler: Arc<dyn PerformanceSampler>,
    notifier: Arc<dyn Notifier>,
    history: RwLock<MetricsHistory>,
    hints: Arc<PerformanceHints>,
    /// Held for the whole of a tick so ticks never overlap
    tick_lock: tokio::sync::Mutex<()>,
    counters: StatCounters,
    #[cfg(feature = "metrics")]
    metrics: MonitorMetrics,
}

/// A running sampling loop
struct MonitorTask {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
    period: Duration,
}

impl MonitorTask {
    /// Ask the loop to exit after any in-flight tick
    fn signal(self) -> JoinHandle<()> {
        let _ = self.shutdown_tx.send(());
        self.handle
    }
}

/// Polling health and metrics monitor
pub struct MetricsMonitor {
    core: Arc<MonitorCore>,
    task: Mutex<Option<MonitorTask>>,
}

/// Builder wiring the monitor's collaborators
pub struct MonitorBuilder {
    config: MonitorConfig,
    store: Option<Arc<dyn CollectionStore>>,
    probe: Option<Arc<dyn DependencyProbe>>,
    sampler: Option<Arc<dyn PerformanceSampler>>,
    notifier: Option<Arc<dyn Notifier>>,
    hints: Arc<PerformanceHints>,
}

impl MonitorBuilder {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            store: None,
            probe: None,
            sampler: None,
            notifier: None,
            hints: PerformanceHints::new(),
        }
    }

    pub fn store(mut self, store: Arc<dyn CollectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn DependencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn sampler(mut self, sampler: Arc<dyn PerformanceSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the monitor. Collaborators not supplied are created from the
    /// configuration: a file store, the configured probe, a process sampler
    /// reading the monitor's [`PerformanceHints`] and a log notifier.
    pub fn build(self) -> Result<MetricsMonitor> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::open(&self.config.storage.base_path)?),
        };
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::from(probe::from_config(&self.config.probes)));
        let sampler = self
            .sampler
            .unwrap_or_else(|| Arc::new(ProcessSampler::new(Arc::clone(&self.hints))));
        let notifier = self
            .notifier
            .unwrap_or_else(|| {
                Arc::new(LogNotifier::new(self.config.notifications.permission_granted))
            });

        let history = MetricsHistory::new(self.config.monitoring.history_capacity);

        let core = MonitorCore {
            config: self.config,
            store,
            probe,
            sampler,
            notifier,
            history: RwLock::new(history),
            hints: self.hints,
            tick_lock: tokio::sync::Mutex::new(()),
            counters: StatCounters::default(),
            #[cfg(feature = "metrics")]
            metrics: MonitorMetrics::new()?,
        };

        info!(
            "Metrics monitor initialized (capacity {}, retention {} days)",
            core.config.monitoring.history_capacity, core.config.monitoring.retention_days
        );

        Ok(MetricsMonitor {
            core: Arc::new(core),
            task: Mutex::new(None),
        })
    }
}

impl MetricsMonitor {
    /// Build a monitor with every collaborator taken from `config`
    pub fn new(config: MonitorConfig) -> Result<Self> {
        MonitorBuilder::new(config).build()
    }

    pub fn builder(config: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder::new(config)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.core.config
    }

    /// Host-reported timings read by the default process sampler. An injected
    /// sampler does not see these.
    pub fn performance_hints(&self) -> &Arc<PerformanceHints> {
        &self.core.hints
    }

    /// Start sampling at the configured interval
    pub fn start(&self) {
        self.start_monitoring(Duration::from_millis(self.core.config.monitoring.interval_ms));
    }

    /// Start sampling every `period`, replacing any loop already running.
    /// Never fails: without a tokio runtime the call is logged and ignored.
    pub fn start_monitoring(&self, period: Duration) {
        let period = if period.is_zero() {
            let fallback = Duration::from_millis(self.core.config.monitoring.interval_ms);
            warn!("Zero monitoring interval requested, using {:?}", fallback);
            fallback
        } else {
            period
        };

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Cannot start monitoring outside a tokio runtime: {}", e);
                return;
            }
        };

        let mut task = self.task_slot();
        if let Some(previous) = task.take() {
            info!("Replacing monitoring loop (was every {:?})", previous.period);
            drop(previous.signal());
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = runtime.spawn(run_loop(Arc::clone(&self.core), period, shutdown_rx));
        *task = Some(MonitorTask { shutdown_tx, handle, period });

        info!("Started monitoring every {:?}", period);
    }

    /// Stop the sampling loop. A tick already in progress completes.
    /// Safe to call when not running.
    pub fn stop_monitoring(&self) {
        if let Some(task) = self.task_slot().take() {
            drop(task.signal());
            info!("Stopped monitoring");
        }
    }

    /// Stop the loop and wait for any in-flight tick to finish. Fails if the
    /// sampling task did not end cleanly.
    pub async fn shutdown(&self) -> Result<()> {
        let task = self.task_slot().take();
        let Some(task) = task else {
            return Ok(());
        };

        let joined = task.signal().await;
        info!("Monitoring loop shut down");
        joined.map_err(|e| {
            MonitorError::Scheduling(format!("monitoring task ended abnormally: {}", e))
        })
    }

    pub fn is_running(&self) -> bool {
        self.task_slot().is_some()
    }

    /// Run one tick now and return the stored sample
    pub async fn collect_now(&self) -> Result<MetricSample> {
        self.core.tick().await
    }

    /// Samples from the last `hours` hours, oldest first
    pub fn get_recent_metrics(&self, hours: f64) -> Vec<MetricSample> {
        self.core.history().recent(hours, Utc::now())
    }

    /// Samples from the configured default window
    pub fn get_default_recent_metrics(&self) -> Vec<MetricSample> {
        self.get_recent_metrics(self.core.config.monitoring.recent_window_hours)
    }

    /// Latest sample, last-hour aggregate and health; `None` before the first sample
    pub fn get_metrics_summary(&self) -> Option<MetricsSummary> {
        self.core.history().summary(Utc::now())
    }

    /// Full retained history as pretty-printed JSON
    pub fn export_metrics(&self) -> String {
        match self.core.history().to_json_pretty() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize metrics history: {}", e);
                "[]".to_string()
            }
        }
    }

    /// Restore samples from an `export_metrics` dump. They merge into the
    /// history in timestamp order and the capacity bound still applies.
    /// Returns how many samples are retained afterwards.
    pub fn import_metrics(&self, json: &str) -> Result<usize> {
        let samples: Vec<MetricSample> = serde_json::from_str(json)?;
        let imported = samples.len();

        let (evicted, len) = {
            let mut history = self.core.history_mut();
            let evicted = history.merge(samples);
            (evicted, history.len())
        };
        self.core.counters.samples_evicted.fetch_add(evicted as u64, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        self.core.metrics.record_history_len(len);

        info!("Imported {} samples, {} retained", imported, len);
        Ok(len)
    }

    /// Drop samples older than the retention window. Returns how many were dropped.
    pub fn cleanup(&self) -> usize {
        let retention = ChronoDuration::days(i64::from(self.core.config.monitoring.retention_days));
        let cutoff = Utc::now() - retention;

        let (dropped, remaining) = {
            let mut history = self.core.history_mut();
            let dropped = history.prune_older_than(cutoff);
            (dropped, history.len())
        };

        #[cfg(feature = "metrics")]
        self.core.metrics.record_history_len(remaining);

        debug!("Cleanup dropped {} samples, {} remain", dropped, remaining);
        dropped
    }

    pub fn history_len(&self) -> usize {
        self.core.history().len()
    }

    pub fn stats(&self) -> MonitorStats {
        let counters = &self.core.counters;
        MonitorStats {
            ticks_completed: counters.ticks_completed.load(Ordering::Relaxed),
            ticks_failed: counters.ticks_failed.load(Ordering::Relaxed),
            alerts_fired: counters.alerts_fired.load(Ordering::Relaxed),
            samples_evicted: counters.samples_evicted.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition of the latest sample and monitor counters
    #[cfg(feature = "metrics")]
    pub fn export_prometheus(&self) -> Result<String> {
        Ok(self.core.metrics.encode()?)
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<MonitorTask>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for MetricsMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

async fn run_loop(
    core: Arc<MonitorCore>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                debug!("Monitoring loop received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                // Failures are logged inside the tick; the next tick is the retry
                let _ = core.tick().await;
            }
        }
    }
}

impl MonitorCore {
    async fn tick(&self) -> Result<MetricSample> {
        let _serialized = self.tick_lock.lock().await;

        let sample = match self.collect_sample().await {
            Ok(sample) => sample,
            Err(e) => {
                self.counters.ticks_failed.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                self.metrics.record_tick_failed();
                error!(category = e.category(), "Metrics collection failed, skipping tick: {}", e);
                return Err(e);
            }
        };

        self.store_sample(&sample);
        self.fire_alerts(&sample).await;
        Ok(sample)
    }

    async fn collect_sample(&self) -> Result<MetricSample> {
        let timestamp = Utc::now();
        let performance = self.sampler.sample();

        let store = self.store.as_ref();
        let predictions: Vec<PredictionRecord> =
            read_collection(store, PREDICTIONS_COLLECTION).await?;
        let users: Vec<UserRecord> = read_collection(store, USERS_COLLECTION).await?;
        let errors: Vec<ErrorRecord> = read_collection(store, ERRORS_COLLECTION).await?;

        let check_timeout = Duration::from_millis(self.config.probes.timeout_ms);
        let dependencies = probe_all(self.probe.as_ref(), check_timeout)
            .await
            .into_iter()
            .collect();

        Ok(MetricSample {
            timestamp,
            performance,
            predictions: PredictionStats::from_records(&predictions),
            dependencies,
            users: UserStats::from_records(&users, timestamp),
            errors: ErrorStats::from_records(&errors),
        })
    }

    fn store_sample(&self, sample: &MetricSample) {
        let (evicted, len) = {
            let mut history = self.history_mut();
            let evicted = history.push(sample.clone());
            (evicted, history.len())
        };

        self.counters.ticks_completed.fetch_add(1, Ordering::Relaxed);
        self.counters.samples_evicted.fetch_add(evicted as u64, Ordering::Relaxed);

        let health = health_score(sample);
        #[cfg(feature = "metrics")]
        self.metrics.record_sample(sample, health, len);

        debug!(
            health,
            memory_bytes = sample.performance.memory_usage_bytes,
            history = len,
            "Stored metrics sample"
        );
    }

    async fn fire_alerts(&self, sample: &MetricSample) {
        for alert in alerts::evaluate(sample, &self.config.thresholds) {
            alerts::dispatch(&alert, self.store.as_ref(), self.notifier.as_ref()).await;
            self.counters.alerts_fired.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "metrics")]
            self.metrics.record_alert(alert.kind);
        }
    }

    fn history(&self) -> RwLockReadGuard<'_, MetricsHistory> {
        self.history.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn history_mut(&self) -> RwLockWriteGuard<'_, MetricsHistory> {
        self.history.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
