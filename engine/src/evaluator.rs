//! Threshold evaluation
//!
//! Pure functions: no I/O, no clock reads beyond the timestamps carried in by
//! the caller. One alert per (sample, violated threshold) pair, ordered by
//! sample then by threshold.

use chrono::{DateTime, Utc};

use crate::types::{AlertEvent, AlertKind, ForecastResult, Sample, Severity, Threshold};

/// Maps samples to alerts against a fixed set of thresholds
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    thresholds: Vec<Threshold>,
    critical_margin: f64,
}

impl ThresholdEvaluator {
    pub fn new(thresholds: Vec<Threshold>, critical_margin: f64) -> Self {
        Self {
            thresholds,
            critical_margin,
        }
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    pub fn evaluate(&self, samples: &[Sample]) -> Vec<AlertEvent> {
        evaluate(samples, &self.thresholds, self.critical_margin)
    }

    pub fn evaluate_forecast(&self, forecast: &ForecastResult) -> Vec<AlertEvent> {
        evaluate_forecast(forecast, &self.thresholds, self.critical_margin)
    }
}

/// Evaluate observed samples. Alerts are tagged [`AlertKind::Realtime`].
pub fn evaluate(samples: &[Sample], thresholds: &[Threshold], critical_margin: f64) -> Vec<AlertEvent> {
    samples
        .iter()
        .flat_map(|sample| {
            violations(
                &sample.name,
                sample.value,
                sample.timestamp,
                AlertKind::Realtime,
                thresholds,
                critical_margin,
            )
        })
        .collect()
}

/// Evaluate predicted values. Alerts are tagged [`AlertKind::Predictive`] and
/// stamped with the forecast's generation time.
pub fn evaluate_forecast(
    forecast: &ForecastResult,
    thresholds: &[Threshold],
    critical_margin: f64,
) -> Vec<AlertEvent> {
    forecast
        .predicted_values
        .iter()
        .flat_map(|(metric, &value)| {
            violations(
                metric,
                value,
                forecast.generated_at,
                AlertKind::Predictive,
                thresholds,
                critical_margin,
            )
        })
        .collect()
}

/// Severity of a violation: critical when the value lies past the limit by
/// more than `critical_margin`
pub fn severity_for(threshold: &Threshold, value: f64, critical_margin: f64) -> Severity {
    if threshold.comparator.overshoot(value, threshold.limit) > critical_margin {
        Severity::Critical
    } else {
        Severity::Warn
    }
}

fn violations<'a>(
    metric: &'a str,
    value: f64,
    timestamp: DateTime<Utc>,
    kind: AlertKind,
    thresholds: &'a [Threshold],
    critical_margin: f64,
) -> impl Iterator<Item = AlertEvent> + 'a {
    thresholds
        .iter()
        .filter(move |t| t.metric == metric && t.comparator.violates(value, t.limit))
        .map(move |t| AlertEvent {
            metric: metric.to_string(),
            observed_value: value,
            threshold: t.clone(),
            severity: severity_for(t, value, critical_margin),
            kind,
            timestamp,
        })
}
