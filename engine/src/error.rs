//! Error handling for the Aurora monitoring engine
//!
//! Startup configuration problems are the only fatal errors. Everything the
//! engine hits while ticking (a source that cannot be read, a forecaster that
//! lacks history, a tick that overran, a sink that stalled) is recoverable and
//! gets turned into a diagnostic event instead of stopping the loop.

use std::io;

use thiserror::Error;

/// The main error type for the monitoring engine
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Metric source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Forecasting errors
    #[error("Forecast error: {0}")]
    Forecast(#[from] ForecastError),

    /// Output sink errors
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// A tick could not start because the previous one was still processing
    #[error("Tick {skipped_tick} skipped: tick {running_tick} still processing")]
    TickOverrun { skipped_tick: u64, running_tick: u64 },

    /// Engine lifecycle errors
    #[error("Engine error: {0}")]
    Engine(String),

    /// Metrics registry errors
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Unknown configuration profile: {name}")]
    UnknownProfile { name: String },

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Threshold references metric '{metric}' that no registered source produces")]
    UnknownMetric { metric: String },

    #[error("Duplicate metric source: {name}")]
    DuplicateSource { name: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration file permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("Configuration parsing error: {reason}")]
    ParseError { reason: String },
}

/// Metric source errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Source '{source_name}' unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("Source '{source_name}' timed out after {timeout_ms} ms")]
    Timeout { source_name: String, timeout_ms: u64 },

    #[error("Source '{source_name}' cancelled")]
    Cancelled { source_name: String },
}

/// Forecasting errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("Insufficient history: {available} samples available, {required} required")]
    InsufficientHistory { required: usize, available: usize },

    #[error("Forecast timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Forecast cancelled")]
    Cancelled,

    #[error("Forecast failed: {reason}")]
    Failed { reason: String },
}

/// Output sink errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("Sink emit of {event_kind} timed out after {timeout_ms} ms")]
    Timeout { event_kind: String, timeout_ms: u64 },

    #[error("Sink closed")]
    Closed,
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MonitorError>;

/// A specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A specialized result type for metric sources
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// A specialized result type for forecasters
pub type ForecasterResult<T> = std::result::Result<T, ForecastError>;

/// A specialized result type for sinks
pub type SinkResult<T> = std::result::Result<T, SinkError>;

impl MonitorError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            MonitorError::Config(_) => false,
            MonitorError::Engine(_) => false,
            MonitorError::Io(io_error) => {
                matches!(io_error.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
            }
            _ => true,
        }
    }

    /// Check if this error aborts startup
    pub fn is_critical(&self) -> bool {
        matches!(self, MonitorError::Config(_))
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            MonitorError::Config(_) => "configuration",
            MonitorError::Source(_) => "source_unavailable",
            MonitorError::Forecast(ForecastError::InsufficientHistory { .. }) => "insufficient_history",
            MonitorError::Forecast(_) => "forecast",
            MonitorError::Sink(SinkError::Timeout { .. }) => "sink_timeout",
            MonitorError::Sink(_) => "sink",
            MonitorError::TickOverrun { .. } => "tick_overrun",
            MonitorError::Engine(_) => "engine",
            MonitorError::Metrics(_) => "metrics",
            MonitorError::Io(_) => "io",
            MonitorError::Serialization(_) => "serialization",
        }
    }
}

impl SourceError {
    /// Name of the source that failed
    pub fn source_name(&self) -> &str {
        match self {
            SourceError::Unavailable { source_name, .. }
            | SourceError::Timeout { source_name, .. }
            | SourceError::Cancelled { source_name } => source_name,
        }
    }
}
