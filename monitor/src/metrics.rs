//! Prometheus exposition for the metrics monitor
//!
//! Gauges mirror the latest stored sample; counters track the monitor's own
//! tick and alert activity.

use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::alerts::AlertKind;
use crate::error::{MetricsError, MetricsResult};
use crate::sample::{DependencyStatus, MetricSample};

/// Prometheus registry and the monitor's gauges and counters
pub struct MonitorMetrics {
    registry: Registry,

    memory_usage: IntGauge,
    load_time: Gauge,
    network_latency: Gauge,
    health_score: Gauge,
    history_len: IntGauge,

    predictions_total: IntGauge,
    predictions_successful: IntGauge,
    users_active: IntGauge,
    errors_critical: IntGauge,

    dependency_up: GaugeVec,
    dependency_response_time: GaugeVec,

    ticks_completed: IntCounter,
    ticks_failed: IntCounter,
    alerts_fired: IntCounterVec,
}

fn registration_failed(e: prometheus::Error) -> MetricsError {
    MetricsError::RegistrationFailed { name: e.to_string() }
}

impl MonitorMetrics {
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new_custom(Some("lottery_monitor".to_string()), None)
            .map_err(registration_failed)?;

        let memory_usage =
            IntGauge::new("memory_usage_bytes", "Resident memory of the monitored process")
                .map_err(registration_failed)?;
        let load_time = Gauge::new("load_time_ms", "Last reported load time")
            .map_err(registration_failed)?;
        let network_latency = Gauge::new("network_latency_ms", "Last reported network latency")
            .map_err(registration_failed)?;
        let health_score = Gauge::new("health_score", "Health score of the latest sample (0-100)")
            .map_err(registration_failed)?;
        let history_len = IntGauge::new("history_samples", "Samples currently retained")
            .map_err(registration_failed)?;

        let predictions_total = IntGauge::new("predictions_total", "Stored predictions")
            .map_err(registration_failed)?;
        let predictions_successful =
            IntGauge::new("predictions_successful", "Stored successful predictions")
                .map_err(registration_failed)?;
        let users_active =
            IntGauge::new("users_active", "Active users").map_err(registration_failed)?;
        let errors_critical = IntGauge::new("errors_critical", "Stored critical errors")
            .map_err(registration_failed)?;

        let dependency_up = GaugeVec::new(
            Opts::new("dependency_up", "1 if the dependency reported online"),
            &["dependency"],
        )
        .map_err(registration_failed)?;
        let dependency_response_time = GaugeVec::new(
            Opts::new("dependency_response_time_ms", "Dependency check response time"),
            &["dependency"],
        )
        .map_err(registration_failed)?;

        let ticks_completed =
            IntCounter::new("ticks_completed_total", "Ticks that stored a sample")
                .map_err(registration_failed)?;
        let ticks_failed = IntCounter::new("ticks_failed_total", "Ticks abandoned after an error")
            .map_err(registration_failed)?;
        let alerts_fired = IntCounterVec::new(
            Opts::new("alerts_fired_total", "Alerts fired by type"),
            &["type"],
        )
        .map_err(registration_failed)?;

        registry.register(Box::new(memory_usage.clone())).map_err(registration_failed)?;
        registry.register(Box::new(load_time.clone())).map_err(registration_failed)?;
        registry.register(Box::new(network_latency.clone())).map_err(registration_failed)?;
        registry.register(Box::new(health_score.clone())).map_err(registration_failed)?;
        registry.register(Box::new(history_len.clone())).map_err(registration_failed)?;
        registry.register(Box::new(predictions_total.clone())).map_err(registration_failed)?;
        registry
            .register(Box::new(predictions_successful.clone()))
            .map_err(registration_failed)?;
        registry.register(Box::new(users_active.clone())).map_err(registration_failed)?;
        registry.register(Box::new(errors_critical.clone())).map_err(registration_failed)?;
        registry.register(Box::new(dependency_up.clone())).map_err(registration_failed)?;
        registry
            .register(Box::new(dependency_response_time.clone()))
            .map_err(registration_failed)?;
        registry.register(Box::new(ticks_completed.clone())).map_err(registration_failed)?;
        registry.register(Box::new(ticks_failed.clone())).map_err(registration_failed)?;
        registry.register(Box::new(alerts_fired.clone())).map_err(registration_failed)?;

        Ok(Self {
            registry,
            memory_usage,
            load_time,
            network_latency,
            health_score,
            history_len,
            predictions_total,
            predictions_successful,
            users_active,
            errors_critical,
            dependency_up,
            dependency_response_time,
            ticks_completed,
            ticks_failed,
            alerts_fired,
        })
    }

    /// Mirror a freshly stored sample
    pub fn record_sample(&self, sample: &MetricSample, health: f64, history_len: usize) {
        self.memory_usage.set(sample.performance.memory_usage_bytes.min(i64::MAX as u64) as i64);
        self.load_time.set(sample.performance.load_time_ms);
        self.network_latency.set(sample.performance.network_latency_ms);
        self.health_score.set(health);
        self.history_len.set(history_len as i64);

        self.predictions_total.set(sample.predictions.total as i64);
        self.predictions_successful.set(sample.predictions.successful as i64);
        self.users_active.set(sample.users.active as i64);
        self.errors_critical.set(sample.errors.critical_count as i64);

        for (dependency, health) in &sample.dependencies {
            let up = if health.status == DependencyStatus::Online { 1.0 } else { 0.0 };
            self.dependency_up.with_label_values(&[dependency.name()]).set(up);
            self.dependency_response_time
                .with_label_values(&[dependency.name()])
                .set(health.response_time_ms);
        }

        self.ticks_completed.inc();
    }

    pub fn record_tick_failed(&self) {
        self.ticks_failed.inc();
    }

    pub fn record_alert(&self, kind: AlertKind) {
        self.alerts_fired.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn record_history_len(&self, history_len: usize) {
        self.history_len.set(history_len as i64);
    }

    /// Prometheus text exposition
    pub fn encode(&self) -> MetricsResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::ExportFailed { reason: e.to_string() })?;
        String::from_utf8(buffer).map_err(|e| MetricsError::ExportFailed { reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{
        Dependency, DependencyHealth, ErrorStats, PerformanceMetrics, PredictionStats, UserStats,
    };
    use chrono::Utc;

    fn sample() -> MetricSample {
        let mut dependencies: std::collections::BTreeMap<_, _> = Dependency::ALL
            .iter()
            .map(|&d| (d, DependencyHealth::online(12.0)))
            .collect();
        dependencies.insert(Dependency::Powerball, DependencyHealth::failed());

        MetricSample {
            timestamp: Utc::now(),
            performance: PerformanceMetrics {
                memory_usage_bytes: 2048,
                load_time_ms: 640.0,
                ..Default::default()
            },
            predictions: PredictionStats {
                total: 5,
                successful: 2,
                failed: 3,
                ..Default::default()
            },
            dependencies,
            users: UserStats { active: 7, total: 9, new_today: 1 },
            errors: ErrorStats::default(),
        }
    }

    #[test]
    fn test_metrics_creation() {
        assert!(MonitorMetrics::new().is_ok());
    }

    #[test]
    fn test_record_and_encode() {
        let metrics = MonitorMetrics::new().unwrap();
        metrics.record_sample(&sample(), 90.0, 1);
        metrics.record_alert(AlertKind::DependencyOffline);
        metrics.record_tick_failed();

        let output = metrics.encode().unwrap();
        assert!(output.contains("lottery_monitor_memory_usage_bytes 2048"));
        assert!(output.contains("lottery_monitor_health_score 90"));
        assert!(output.contains("lottery_monitor_dependency_up{dependency=\"powerball\"} 0"));
        assert!(output.contains("lottery_monitor_dependency_up{dependency=\"megaMillions\"} 1"));
        assert!(
            output.contains("lottery_monitor_alerts_fired_total{type=\"dependency_offline\"} 1")
        );
        assert!(output.contains("lottery_monitor_ticks_failed_total 1"));
        assert!(output.contains("lottery_monitor_ticks_completed_total 1"));
    }

    #[test]
    fn test_counters() {
        let metrics = MonitorMetrics::new().unwrap();
        metrics.record_sample(&sample(), 100.0, 1);
        metrics.record_sample(&sample(), 100.0, 2);
        assert_eq!(metrics.ticks_completed.get(), 2);
        assert_eq!(metrics.history_len.get(), 2);
    }
}
