//! Core data model shared by sources, the evaluator, forecasters and sinks

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MonitorError;

/// One named numeric observation at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self::at(name, value, Utc::now())
    }

    pub fn at(name: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
        }
    }
}

/// Threshold comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Ge,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Le,
}

impl Comparator {
    /// Whether `value` violates a threshold at `limit`. NaN never violates.
    pub fn violates(self, value: f64, limit: f64) -> bool {
        match self {
            Comparator::Gt => value > limit,
            Comparator::Ge => value >= limit,
            Comparator::Lt => value < limit,
            Comparator::Le => value <= limit,
        }
    }

    /// Distance by which `value` lies past `limit` in the violating direction
    pub fn overshoot(self, value: f64, limit: f64) -> f64 {
        match self {
            Comparator::Gt | Comparator::Ge => value - limit,
            Comparator::Lt | Comparator::Le => limit - value,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
        };
        f.write_str(symbol)
    }
}

/// A configured limit on one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: String,
    pub limit: f64,
    pub comparator: Comparator,
}

impl Threshold {
    pub fn new(metric: impl Into<String>, comparator: Comparator, limit: f64) -> Self {
        Self {
            metric: metric.into(),
            limit,
            comparator,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.metric, self.comparator, self.limit)
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    Critical,
}

/// Whether an alert comes from an observed sample or a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Realtime,
    Predictive,
}

/// A threshold violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub metric: String,
    pub observed_value: f64,
    pub threshold: Threshold,
    pub severity: Severity,
    pub kind: AlertKind,
    pub timestamp: DateTime<Utc>,
}

/// Output of a forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// Predicted value per metric, ordered by metric name
    pub predicted_values: BTreeMap<String, f64>,
    /// Confidence in percent, within [0, 100]
    pub confidence: f64,
    pub horizon_seconds: u64,
    pub generated_at: DateTime<Utc>,
}

/// Overall verdict for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every source answered and nothing crossed a threshold
    Healthy,
    /// At least one warning alert
    Warning,
    /// At least one critical alert
    Critical,
    /// No alerts but at least one source failed
    Degraded,
}

/// A source that failed during a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedReading {
    pub source: String,
    pub reason: String,
}

/// Per-tick summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub id: Uuid,
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub samples: Vec<Sample>,
    pub degraded: Vec<DegradedReading>,
    pub alert_count: usize,
    pub status: HealthStatus,
    pub duration_ms: u64,
}

impl HealthReport {
    /// Derive the tick status from its alerts and failed sources
    pub fn status_for(alerts: &[AlertEvent], degraded: &[DegradedReading]) -> HealthStatus {
        if alerts.iter().any(|a| a.severity == Severity::Critical) {
            HealthStatus::Critical
        } else if !alerts.is_empty() {
            HealthStatus::Warning
        } else if !degraded.is_empty() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Kinds of recoverable problems reported as events. Sink failures are
/// only logged and counted, never sent to the sink they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    SourceUnavailable,
    InsufficientHistory,
    ForecastFailed,
    TickOverrun,
    Other,
}

/// A recoverable error converted into a reportable event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub tick: Option<u64>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Diagnostic {
    pub fn from_error(tick: Option<u64>, error: &MonitorError) -> Self {
        let kind = match error.category() {
            "source_unavailable" => DiagnosticKind::SourceUnavailable,
            "insufficient_history" => DiagnosticKind::InsufficientHistory,
            "forecast" => DiagnosticKind::ForecastFailed,
            "tick_overrun" => DiagnosticKind::TickOverrun,
            _ => DiagnosticKind::Other,
        };

        Self {
            kind,
            tick,
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Everything the engine hands to an output sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Alert(AlertEvent),
    Health(HealthReport),
    Forecast(ForecastResult),
    Diagnostic(Diagnostic),
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Alert(_) => "alert",
            EngineEvent::Health(_) => "health",
            EngineEvent::Forecast(_) => "forecast",
            EngineEvent::Diagnostic(_) => "diagnostic",
        }
    }
}
