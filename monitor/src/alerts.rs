//! Threshold alerts
//!
//! Thresholds are checked independently against each fresh sample, so any
//! subset of alerts can fire in one tick. Fired alerts are appended to the
//! `alerts` collection and, when permission was already granted, shown as a
//! local notification. Delivery is fire-and-forget.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AlertThresholds;
use crate::error::{NotificationError, NotificationResult};
use crate::sample::{DependencyStatus, MetricSample};
use crate::schema::ALERTS_COLLECTION;
use crate::storage::{append_to_collection, CollectionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighMemory,
    SlowLoad,
    DependencyOffline,
    CriticalErrors,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::HighMemory => "high_memory",
            AlertKind::SlowLoad => "slow_load",
            AlertKind::DependencyOffline => "dependency_offline",
            AlertKind::CriticalErrors => "critical_errors",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fired alert, as appended to the alert log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Alerts raised by `sample` under `thresholds`
pub fn evaluate(sample: &MetricSample, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let mut raise = |kind: AlertKind, message: String| {
        alerts.push(Alert { kind, message, timestamp: sample.timestamp });
    };

    let memory = sample.performance.memory_usage_bytes;
    if memory > thresholds.memory_usage_bytes {
        raise(
            AlertKind::HighMemory,
            format!("High memory usage: {:.1}MB", memory as f64 / 1024.0 / 1024.0),
        );
    }

    let load_time = sample.performance.load_time_ms;
    if load_time > thresholds.load_time_ms {
        raise(AlertKind::SlowLoad, format!("Slow page load time: {:.0}ms", load_time));
    }

    for (dependency, health) in sample.unavailable_dependencies() {
        let state = match health.status {
            DependencyStatus::Error => "failing",
            _ => "offline",
        };
        raise(
            AlertKind::DependencyOffline,
            format!("Dependency {} is {}", dependency, state),
        );
    }

    let critical = sample.errors.critical_count;
    if critical > 0 {
        raise(AlertKind::CriticalErrors, format!("{} critical errors detected", critical));
    }

    alerts
}

/// Local notification surface
pub trait Notifier: Send + Sync {
    /// Whether the user already granted permission. Never prompts.
    fn permission_granted(&self) -> bool;

    fn notify(&self, title: &str, body: &str) -> NotificationResult<()>;
}

/// Notifier that writes notifications to the log
pub struct LogNotifier {
    permission_granted: bool,
}

impl LogNotifier {
    pub fn new(permission_granted: bool) -> Self {
        Self { permission_granted }
    }
}

impl Notifier for LogNotifier {
    fn permission_granted(&self) -> bool {
        self.permission_granted
    }

    fn notify(&self, title: &str, body: &str) -> NotificationResult<()> {
        if !self.permission_granted {
            return Err(NotificationError::PermissionDenied);
        }
        tracing::info!(target: "lottery_monitor::notification", title, body, "Notification shown");
        Ok(())
    }
}

/// Persist and surface one alert. Returns whether the alert reached the log;
/// failures are logged, never propagated.
pub async fn dispatch(alert: &Alert, store: &dyn CollectionStore, notifier: &dyn Notifier) -> bool {
    tracing::warn!(kind = %alert.kind, "Alert: {}", alert.message);

    let logged = match append_to_collection(store, ALERTS_COLLECTION, alert).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Failed to append alert to log: {}", e);
            false
        }
    };

    if notifier.permission_granted() {
        if let Err(e) = notifier.notify("Lottery site alert", &alert.message) {
            tracing::debug!("Notification not delivered: {}", e);
        }
    }

    logged
}
