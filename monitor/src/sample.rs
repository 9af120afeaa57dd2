//! Metric sample data model
//!
//! One [`MetricSample`] is produced per tick and never modified afterwards.
//! Field names serialize in camelCase and are part of the export format.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::{ErrorRecord, PredictionRecord, UserRecord};

/// A complete snapshot captured by one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub performance: PerformanceMetrics,
    pub predictions: PredictionStats,
    pub dependencies: BTreeMap<Dependency, DependencyHealth>,
    pub users: UserStats,
    pub errors: ErrorStats,
}

/// In-process performance counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub load_time_ms: f64,
    pub memory_usage_bytes: u64,
    /// Always 0; CPU usage is not sampled
    pub cpu_usage_percent: f64,
    pub network_latency_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub average_confidence: f64,
    pub average_accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub active: u64,
    pub total: u64,
    pub new_today: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub count: u64,
    pub last_error_message: Option<String>,
    pub critical_count: u64,
}

/// The fixed set of external services the monitor checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dependency {
    Powerball,
    MegaMillions,
    EuroMillions,
}

impl Dependency {
    pub const ALL: [Dependency; 3] = [
        Dependency::Powerball,
        Dependency::MegaMillions,
        Dependency::EuroMillions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dependency::Powerball => "powerball",
            Dependency::MegaMillions => "megaMillions",
            Dependency::EuroMillions => "euroMillions",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    Online,
    Offline,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyHealth {
    pub status: DependencyStatus,
    pub response_time_ms: f64,
}

impl DependencyHealth {
    pub fn online(response_time_ms: f64) -> Self {
        Self { status: DependencyStatus::Online, response_time_ms }
    }

    pub fn offline(response_time_ms: f64) -> Self {
        Self { status: DependencyStatus::Offline, response_time_ms }
    }

    /// A failed check: status `error`, no response time
    pub fn failed() -> Self {
        Self { status: DependencyStatus::Error, response_time_ms: 0.0 }
    }

    pub fn is_online(&self) -> bool {
        self.status == DependencyStatus::Online
    }
}

impl MetricSample {
    /// Dependencies whose status is not `online`
    pub fn unavailable_dependencies(
        &self,
    ) -> impl Iterator<Item = (&Dependency, &DependencyHealth)> {
        self.dependencies.iter().filter(|(_, health)| !health.is_online())
    }
}

impl PredictionStats {
    pub fn from_records(records: &[PredictionRecord]) -> Self {
        let total = records.len() as u64;
        let successful = records.iter().filter(|r| r.success).count() as u64;

        let (average_confidence, average_accuracy) = if records.is_empty() {
            (0.0, 0.0)
        } else {
            let n = records.len() as f64;
            (
                records.iter().map(|r| r.confidence).sum::<f64>() / n,
                records.iter().map(|r| r.accuracy).sum::<f64>() / n,
            )
        };

        Self {
            total,
            successful,
            failed: total - successful,
            average_confidence,
            average_accuracy,
        }
    }
}

impl UserStats {
    /// `now` decides which UTC calendar day counts as today
    pub fn from_records(records: &[UserRecord], now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        Self {
            active: records.iter().filter(|r| r.is_active).count() as u64,
            total: records.len() as u64,
            new_today: records
                .iter()
                .filter(|r| r.created_at.map(|at| at.date_naive() == today).unwrap_or(false))
                .count() as u64,
        }
    }
}

impl ErrorStats {
    pub fn from_records(records: &[ErrorRecord]) -> Self {
        Self {
            count: records.len() as u64,
            last_error_message: records
                .last()
                .map(|r| r.message.clone())
                .filter(|message| !message.is_empty()),
            critical_count: records.iter().filter(|r| r.is_critical()).count() as u64,
        }
    }
}
