//! Dependency probes
//!
//! The site never talked to the lottery feeds it claims to watch; checks were
//! simulated. [`DependencyProbe`] keeps that seam pluggable so a real checker
//! can be dropped in, and so tests can use [`StaticProbe`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ProbeConfig, ProbeMode};
use crate::error::{ProbeError, ProbeResult};
use crate::sample::{Dependency, DependencyHealth};

/// Health check for one named dependency
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    async fn check(&self, dependency: Dependency) -> ProbeResult<DependencyHealth>;
}

/// Probe every fixed dependency concurrently. A check that fails or outlives
/// `timeout` marks only that dependency as `error`.
pub async fn probe_all(
    probe: &dyn DependencyProbe,
    timeout: Duration,
) -> Vec<(Dependency, DependencyHealth)> {
    let checks = Dependency::ALL.iter().map(|&dependency| async move {
        let result = match tokio::time::timeout(timeout, probe.check(dependency)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout {
                name: dependency.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        let health = match result {
            Ok(health) => health,
            Err(e) => {
                tracing::debug!("Dependency check failed: {}", e);
                DependencyHealth::failed()
            }
        };
        (dependency, health)
    });

    join_all(checks).await
}

/// Build the probe selected by configuration
pub fn from_config(config: &ProbeConfig) -> Box<dyn DependencyProbe> {
    match config.mode {
        ProbeMode::Simulated => Box::new(SimulatedProbe::new(config)),
        ProbeMode::Static => Box::new(StaticProbe::all_online()),
    }
}

/// Random latency in `[0, max_latency]` with a fixed success probability
pub struct SimulatedProbe {
    rng: Mutex<StdRng>,
    success_rate: f64,
    max_latency_ms: u64,
    simulate_delay: bool,
}

impl SimulatedProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            rng: Mutex::new(rng),
            success_rate: config.success_rate.clamp(0.0, 1.0),
            max_latency_ms: config.max_latency_ms,
            simulate_delay: config.simulate_delay,
        }
    }

    fn roll(&self) -> (u64, bool) {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let latency_ms = rng.gen_range(0..=self.max_latency_ms);
        let succeeded = rng.gen_bool(self.success_rate);
        (latency_ms, succeeded)
    }
}

#[async_trait]
impl DependencyProbe for SimulatedProbe {
    async fn check(&self, dependency: Dependency) -> ProbeResult<DependencyHealth> {
        let (latency_ms, succeeded) = self.roll();

        if self.simulate_delay && latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }

        if succeeded {
            Ok(DependencyHealth::online(latency_ms as f64))
        } else {
            Err(ProbeError::CheckFailed {
                name: dependency.to_string(),
                reason: "simulated failure".to_string(),
            })
        }
    }
}

/// Fixed answers per dependency; unlisted dependencies are online with zero latency
#[derive(Default)]
pub struct StaticProbe {
    answers: HashMap<Dependency, DependencyHealth>,
    failing: Vec<Dependency>,
}

impl StaticProbe {
    pub fn all_online() -> Self {
        Self::default()
    }

    pub fn with_health(mut self, dependency: Dependency, health: DependencyHealth) -> Self {
        self.answers.insert(dependency, health);
        self
    }

    /// Make the check itself fail for `dependency`
    pub fn with_failure(mut self, dependency: Dependency) -> Self {
        self.failing.push(dependency);
        self
    }
}

#[async_trait]
impl DependencyProbe for StaticProbe {
    async fn check(&self, dependency: Dependency) -> ProbeResult<DependencyHealth> {
        if self.failing.contains(&dependency) {
            return Err(ProbeError::CheckFailed {
                name: dependency.to_string(),
                reason: "configured to fail".to_string(),
            });
        }

        Ok(self
            .answers
            .get(&dependency)
            .copied()
            .unwrap_or_else(|| DependencyHealth::online(0.0)))
    }
}
