//! Lottery site metrics monitor library
//!
//! This library provides a polling health and metrics monitor for the lottery
//! prediction site. On a fixed interval it samples process performance,
//! summarizes the locally stored prediction, user and error collections,
//! probes the lottery data providers, keeps a bounded history of samples and
//! raises threshold alerts.

pub mod alerts;
pub mod config;
pub mod error;
pub mod health;
pub mod history;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod monitor;
pub mod performance;
pub mod probe;
pub mod sample;
pub mod schema;
pub mod storage;

// Re-export commonly used types
pub use alerts::{Alert, AlertKind, LogNotifier, Notifier};
pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use health::{health_score, HealthStatus};
pub use history::{MetricsHistory, MetricsSummary, WindowAggregate};
pub use monitor::{MetricsMonitor, MonitorBuilder, MonitorStats};
pub use performance::{PerformanceHints, PerformanceSampler, ProcessSampler};
pub use probe::{DependencyProbe, SimulatedProbe, StaticProbe};
pub use sample::{Dependency, DependencyHealth, DependencyStatus, MetricSample};
pub use storage::{CollectionStore, FileStore, MemoryStore};
