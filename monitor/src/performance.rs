//! Performance counter sampling
//!
//! The monitor reads performance counters through [`PerformanceSampler`].
//! [`ProcessSampler`] reports the resident memory of the current process and
//! whatever load time and network latency the host recorded on its
//! [`PerformanceHints`]. Anything unavailable reads as zero.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::{Pid, System};

use crate::sample::PerformanceMetrics;

/// Source of in-process performance counters
pub trait PerformanceSampler: Send + Sync {
    /// Read the counters. Must not fail; unavailable values are 0.
    fn sample(&self) -> PerformanceMetrics;
}

/// Timings reported by the host application
#[derive(Debug, Default)]
pub struct PerformanceHints {
    load_time_us: AtomicU64,
    network_latency_us: AtomicU64,
}

impl PerformanceHints {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record how long the host took to become ready
    pub fn record_load_time(&self, duration: Duration) {
        self.load_time_us.store(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record the latest measured round trip to the network
    pub fn record_network_latency(&self, duration: Duration) {
        self.network_latency_us.store(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn load_time_ms(&self) -> f64 {
        self.load_time_us.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn network_latency_ms(&self) -> f64 {
        self.network_latency_us.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

/// Samples the current process with `sysinfo`
pub struct ProcessSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
    hints: Arc<PerformanceHints>,
}

impl ProcessSampler {
    pub fn new(hints: Arc<PerformanceHints>) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Process memory unavailable: {}", e);
                None
            }
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
            hints,
        }
    }

    fn memory_usage_bytes(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };

        let mut system = self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !system.refresh_process(pid) {
            return 0;
        }
        system.process(pid).map(|process| process.memory()).unwrap_or(0)
    }
}

impl PerformanceSampler for ProcessSampler {
    fn sample(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            load_time_ms: self.hints.load_time_ms(),
            memory_usage_bytes: self.memory_usage_bytes(),
            cpu_usage_percent: 0.0,
            network_latency_ms: self.hints.network_latency_ms(),
        }
    }
}
