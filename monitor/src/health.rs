//! Health score
//!
//! A deterministic 0-100 heuristic computed from a single sample.

use serde::{Deserialize, Serialize};

use crate::sample::MetricSample;

const MIB: u64 = 1024 * 1024;

const MAX_SCORE: f64 = 100.0;
const MEMORY_PENALTY_BYTES: u64 = 50 * MIB;
const MEMORY_PENALTY: f64 = 20.0;
const LOAD_TIME_PENALTY_MS: f64 = 2000.0;
const LOAD_TIME_PENALTY: f64 = 15.0;
const DEPENDENCY_PENALTY: f64 = 10.0;
const CRITICAL_ERROR_PENALTY: f64 = 5.0;
const ERROR_PENALTY: f64 = 0.1;
const MAX_ERROR_PENALTY: f64 = 20.0;

/// Health score of a sample, clamped to `[0, 100]`
pub fn health_score(sample: &MetricSample) -> f64 {
    let mut score = MAX_SCORE;

    if sample.performance.memory_usage_bytes > MEMORY_PENALTY_BYTES {
        score -= MEMORY_PENALTY;
    }

    if sample.performance.load_time_ms > LOAD_TIME_PENALTY_MS {
        score -= LOAD_TIME_PENALTY;
    }

    score -= DEPENDENCY_PENALTY * sample.unavailable_dependencies().count() as f64;
    score -= CRITICAL_ERROR_PENALTY * sample.errors.critical_count as f64;
    score -= (ERROR_PENALTY * sample.errors.count as f64).min(MAX_ERROR_PENALTY);

    score.clamp(0.0, MAX_SCORE)
}

/// Coarse classification of a health score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            HealthStatus::Healthy
        } else if score >= 50.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Critical
        }
    }
}
