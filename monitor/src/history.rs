//! Bounded sample history
//!
//! Samples are kept oldest-first in a FIFO capped at a fixed capacity.
//! A separate retention cutoff is applied by `prune_older_than`; the two
//! bounds are independent.

use std::collections::VecDeque;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::health::{health_score, HealthStatus};
use crate::sample::MetricSample;

/// Default number of samples retained
pub const DEFAULT_CAPACITY: usize = 1000;

/// In-memory FIFO of samples
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

/// Aggregate over the samples of the last hour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowAggregate {
    pub sample_count: usize,
    pub average_load_time_ms: f64,
    pub average_memory_usage_bytes: f64,
    pub total_predictions: u64,
    pub successful_predictions: u64,
    pub total_errors: u64,
}

/// Snapshot returned by `get_metrics_summary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub current: MetricSample,
    pub last_hour: WindowAggregate,
    pub health: f64,
    pub status: HealthStatus,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    /// Append a sample, evicting the oldest while over capacity.
    /// Returns how many samples were evicted.
    pub fn push(&mut self, sample: MetricSample) -> usize {
        self.samples.push_back(sample);
        let mut evicted = 0;
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Samples strictly newer than `since`, oldest first
    pub fn since(&self, since: DateTime<Utc>) -> Vec<MetricSample> {
        self.samples
            .iter()
            .filter(|sample| sample.timestamp > since)
            .cloned()
            .collect()
    }

    /// Samples from the last `hours` hours relative to `now`
    pub fn recent(&self, hours: f64, now: DateTime<Utc>) -> Vec<MetricSample> {
        if hours.is_nan() || hours <= 0.0 {
            return Vec::new();
        }
        let cutoff = now
            .checked_sub_signed(hours_to_duration(hours))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.since(cutoff)
    }

    /// Merge `samples` into the history in timestamp order, keeping the newest
    /// within capacity. Returns how many samples were evicted.
    pub fn merge(&mut self, samples: Vec<MetricSample>) -> usize {
        let mut merged: Vec<MetricSample> = self.samples.drain(..).chain(samples).collect();
        merged.sort_by_key(|sample| sample.timestamp);

        let evicted = merged.len().saturating_sub(self.capacity);
        self.samples = merged.into_iter().skip(evicted).collect();
        evicted
    }

    /// Drop samples older than `cutoff`. Returns how many were dropped.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.samples.len();
        self.samples.retain(|sample| sample.timestamp >= cutoff);
        before - self.samples.len()
    }

    /// Summary of the latest sample and the hour before `now`
    pub fn summary(&self, now: DateTime<Utc>) -> Option<MetricsSummary> {
        let current = self.latest()?.clone();
        let last_hour = aggregate(&self.recent(1.0, now));
        let health = health_score(&current);

        Some(MetricsSummary {
            current,
            last_hour,
            health,
            status: HealthStatus::from_score(health),
        })
    }

    /// Pretty-printed JSON array of every retained sample
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.samples)
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn aggregate(samples: &[MetricSample]) -> WindowAggregate {
    if samples.is_empty() {
        return WindowAggregate::default();
    }

    let n = samples.len() as f64;
    WindowAggregate {
        sample_count: samples.len(),
        average_load_time_ms: samples.iter().map(|s| s.performance.load_time_ms).sum::<f64>() / n,
        average_memory_usage_bytes: samples
            .iter()
            .map(|s| s.performance.memory_usage_bytes as f64)
            .sum::<f64>()
            / n,
        total_predictions: samples.iter().map(|s| s.predictions.total).sum(),
        successful_predictions: samples.iter().map(|s| s.predictions.successful).sum(),
        total_errors: samples.iter().map(|s| s.errors.count).sum(),
    }
}

fn hours_to_duration(hours: f64) -> ChronoDuration {
    let millis = (hours * 3_600_000.0).min((i64::MAX / 2) as f64);
    ChronoDuration::milliseconds(millis as i64)
}
