//! Aurora monitoring engine library
//!
//! A periodic health monitor: metric sources are sampled on a fixed tick,
//! samples are checked against thresholds, kept in a bounded history, and
//! optionally fed to a forecaster. Alerts, health reports, forecasts and
//! diagnostics are handed to an output sink.

pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod forecast;
pub mod history;
pub mod metrics;
pub mod sink;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{Engine, EngineState, EngineStatus, TickStats};
pub use error::{ConfigError, ForecastError, MonitorError, Result, SinkError, SourceError};
pub use evaluator::ThresholdEvaluator;
pub use forecast::{Forecaster, LinearTrendForecaster};
pub use history::HistoryBuffer;
pub use metrics::EngineMetrics;
pub use sink::{emit_bounded, ChannelSink, OutputSink, TracingSink};
pub use source::{AvailabilitySource, MetricSource, SimulatedSource, SourceSpec, SystemResource, SystemSource};
pub use types::{
    AlertEvent, AlertKind, Comparator, DegradedReading, Diagnostic, DiagnosticKind, EngineEvent, ForecastResult,
    HealthReport, HealthStatus, Sample, Severity, Threshold,
};
