//! Error handling for the lottery metrics monitor
//!
//! This module provides the error types for every monitor operation,
//! including local collection access, dependency probes, notifications,
//! configuration and metrics exposition.

use std::io;

use thiserror::Error;

/// The main error type for the monitor
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Local collection storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dependency probe errors
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Local notification errors
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    /// Metrics exposition errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sampling task failures (the loop task panicked or was aborted)
    #[error("Scheduling error: {0}")]
    Scheduling(String),
}

/// Local collection storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid collection key: {key}")]
    InvalidKey { key: String },

    #[error("Collection {key} is malformed: {reason}")]
    Malformed { key: String, reason: String },

    #[error("Failed to read collection {key}: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Failed to write collection {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Directory creation failed: {path}")]
    DirectoryCreationFailed { path: String },
}

/// Configuration related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration file permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("Configuration parsing error: {reason}")]
    ParseError { reason: String },
}

/// Dependency probe errors
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Dependency {name} check failed: {reason}")]
    CheckFailed { name: String, reason: String },

    #[error("Dependency {name} timed out after {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },
}

/// Local notification errors
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification permission not granted")]
    PermissionDenied,
}

/// Metrics exposition errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metrics export failed: {reason}")]
    ExportFailed { reason: String },

    #[error("Metric registration failed: {name}")]
    RegistrationFailed { name: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MonitorError>;

/// A specialized result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A specialized result type for probe operations
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// A specialized result type for notification operations
pub type NotificationResult<T> = std::result::Result<T, NotificationError>;

/// A specialized result type for metrics operations
pub type MetricsResult<T> = std::result::Result<T, MetricsError>;

impl MonitorError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            MonitorError::Storage(_) => "storage",
            MonitorError::Config(_) => "config",
            MonitorError::Probe(_) => "probe",
            MonitorError::Notification(_) => "notification",
            MonitorError::Metrics(_) => "metrics",
            MonitorError::Io(_) => "io",
            MonitorError::Serialization(_) => "serialization",
            MonitorError::Scheduling(_) => "scheduling",
        }
    }
}
