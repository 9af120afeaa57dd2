//! Configuration management for the lottery metrics monitor
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files and environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

const MIB: u64 = 1024 * 1024;

/// Main configuration structure for the monitor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sampling loop configuration
    pub monitoring: MonitoringConfig,

    /// Alert threshold configuration
    pub thresholds: AlertThresholds,

    /// Dependency probe configuration
    pub probes: ProbeConfig,

    /// Local collection storage configuration
    pub storage: StorageConfig,

    /// Local notification configuration
    pub notifications: NotificationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Sampling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Interval between ticks in milliseconds
    pub interval_ms: u64,

    /// Maximum number of samples retained in memory
    pub history_capacity: usize,

    /// Samples older than this are dropped by cleanup
    pub retention_days: u32,

    /// Window used by `get_recent_metrics` when the caller has no preference
    pub recent_window_hours: f64,

    /// How often the daemon runs cleanup, in ticks
    pub cleanup_every_ticks: u64,
}

/// Alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Memory usage above which `high_memory` fires
    pub memory_usage_bytes: u64,

    /// Load time above which `slow_load` fires
    pub load_time_ms: f64,
}

/// How dependencies are probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    /// Random latency and random failures
    Simulated,
    /// Every dependency reports online with zero latency
    Static,
}

/// Dependency probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probe implementation
    pub mode: ProbeMode,

    /// Probability that a simulated check succeeds (0.0-1.0)
    pub success_rate: f64,

    /// Upper bound of the simulated latency in milliseconds
    pub max_latency_ms: u64,

    /// Whether simulated probes actually sleep for their latency
    pub simulate_delay: bool,

    /// Optional RNG seed for reproducible simulations
    pub seed: Option<u64>,

    /// A check still pending after this long is recorded as failed
    pub timeout_ms: u64,
}

/// Local collection storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON file per collection
    pub base_path: PathBuf,
}

/// Local notification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Whether the user has already granted notification permission
    pub permission_granted: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Log format ("pretty" or "json")
    pub format: String,

    /// Optional log file path, rotated daily
    pub file_path: Option<PathBuf>,

    /// Enable console logging
    pub console: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            history_capacity: 1000,
            retention_days: 7,
            recent_window_hours: 24.0,
            cleanup_every_ticks: 120,
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            memory_usage_bytes: 100 * MIB,
            load_time_ms: 3000.0,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            mode: ProbeMode::Simulated,
            success_rate: 0.9,
            max_latency_ms: 1000,
            simulate_delay: true,
            seed: None,
            timeout_ms: 5000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("lottery-monitor")
            .join("storage");

        Self { base_path }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
            console: true,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.to_string_lossy().to_string() })?;

        let config: MonitorConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError { reason: e.to_string() })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `LOTTERY_MONITOR_*` environment overrides on top of this configuration
    pub fn apply_env(mut self) -> ConfigResult<Self> {
        if let Ok(interval) = std::env::var("LOTTERY_MONITOR_INTERVAL_MS") {
            self.monitoring.interval_ms = parse_env("LOTTERY_MONITOR_INTERVAL_MS", interval)?;
        }

        if let Ok(capacity) = std::env::var("LOTTERY_MONITOR_HISTORY_CAPACITY") {
            self.monitoring.history_capacity =
                parse_env("LOTTERY_MONITOR_HISTORY_CAPACITY", capacity)?;
        }

        if let Ok(base_path) = std::env::var("LOTTERY_MONITOR_STORAGE_PATH") {
            self.storage.base_path = PathBuf::from(base_path);
        }

        if let Ok(mode) = std::env::var("LOTTERY_MONITOR_PROBE_MODE") {
            self.probes.mode = match mode.to_lowercase().as_str() {
                "simulated" => ProbeMode::Simulated,
                "static" => ProbeMode::Static,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "LOTTERY_MONITOR_PROBE_MODE".to_string(),
                        value: mode,
                    })
                }
            };
        }

        if let Ok(granted) = std::env::var("LOTTERY_MONITOR_NOTIFICATIONS") {
            self.notifications.permission_granted =
                parse_env("LOTTERY_MONITOR_NOTIFICATIONS", granted)?;
        }

        if let Ok(log_level) = std::env::var("LOTTERY_MONITOR_LOG_LEVEL") {
            self.logging.level = log_level;
        }

        Ok(self)
    }

    /// Load configuration from environment variables over defaults
    pub fn from_env() -> ConfigResult<Self> {
        let config = MonitorConfig::default().apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback order: file -> env -> defaults
    pub fn load_with_fallback<P: AsRef<Path>>(config_path: Option<P>) -> ConfigResult<Self> {
        match config_path {
            Some(path) if path.as_ref().exists() => {
                let config = MonitorConfig::from_file(path)?.apply_env()?;
                config.validate()?;
                Ok(config)
            }
            _ => MonitorConfig::from_env(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.monitoring.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "monitoring.interval_ms".to_string(),
                value: "0".to_string(),
            });
        }

        if self.monitoring.history_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "monitoring.history_capacity".to_string(),
                value: "0".to_string(),
            });
        }

        if self.monitoring.retention_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "monitoring.retention_days".to_string(),
                value: "0".to_string(),
            });
        }

        let window = self.monitoring.recent_window_hours;
        if window.is_nan() || window < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "monitoring.recent_window_hours".to_string(),
                value: window.to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.probes.success_rate) {
            return Err(ConfigError::InvalidValue {
                field: "probes.success_rate".to_string(),
                value: self.probes.success_rate.to_string(),
            });
        }

        if self.probes.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "probes.timeout_ms".to_string(),
                value: "0".to_string(),
            });
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::InvalidValue {
                field: "logging.format".to_string(),
                value: self.logging.format.clone(),
            });
        }

        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("lottery-monitor").join("monitor.toml"))
            .ok_or_else(|| ConfigError::ValidationFailed {
                reason: "Unable to determine config directory".to_string(),
            })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| ConfigError::ValidationFailed {
                reason: format!("Unable to create config directory: {}", parent.display()),
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationFailed { reason: e.to_string() })?;

        fs::write(path, content)
            .map_err(|_| ConfigError::PermissionDenied {
                path: path.to_string_lossy().to_string(),
            })?;

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> ConfigResult<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value,
    })
}
