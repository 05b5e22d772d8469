//! Forecasting contract and a least-squares trend forecaster

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::{ForecastError, ForecasterResult};
use crate::types::{ForecastResult, Sample};

/// Capability predicting future metric values from recent history
#[async_trait]
pub trait Forecaster: Send + Sync {
    fn name(&self) -> &str;

    /// Minimum number of samples per metric required to predict
    fn min_history(&self) -> usize;

    /// Predict each metric `horizon_seconds` past its latest sample.
    ///
    /// `history` is ordered oldest first and may interleave metrics. Fails
    /// with [`ForecastError::InsufficientHistory`] when no metric has at
    /// least [`Forecaster::min_history`] samples.
    async fn predict(
        &self,
        history: &[Sample],
        horizon_seconds: u64,
        cancel: &CancellationToken,
    ) -> ForecasterResult<ForecastResult>;
}

/// Group samples per metric, preserving order, and check coverage against
/// `min_history`. Shared by forecaster implementations.
pub fn group_history(history: &[Sample], min_history: usize) -> ForecasterResult<BTreeMap<&str, Vec<&Sample>>> {
    let mut grouped: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
    for sample in history {
        grouped.entry(sample.name.as_str()).or_default().push(sample);
    }

    let available = grouped.values().map(Vec::len).max().unwrap_or(0);
    if available < min_history || available == 0 {
        return Err(ForecastError::InsufficientHistory {
            required: min_history,
            available,
        });
    }

    grouped.retain(|_, samples| samples.len() >= min_history);
    Ok(grouped)
}

/// Fits `value = a + b * t` per metric and extrapolates to the horizon.
/// Confidence is the mean coefficient of determination, in percent.
#[derive(Debug, Clone)]
pub struct LinearTrendForecaster {
    min_history: usize,
    bounds: Option<(f64, f64)>,
    metric_bounds: HashMap<String, (f64, f64)>,
}

impl LinearTrendForecaster {
    pub fn new(min_history: usize) -> Self {
        Self {
            min_history: min_history.max(2),
            bounds: None,
            metric_bounds: HashMap::new(),
        }
    }

    /// Clamp predictions into `[min, max]`, e.g. `0..=100` for percentages
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = Some((min, max));
        self
    }

    /// Clamp predictions for one metric, taking precedence over [`with_bounds`]
    ///
    /// [`with_bounds`]: LinearTrendForecaster::with_bounds
    pub fn with_metric_bounds(mut self, metric: impl Into<String>, min: f64, max: f64) -> Self {
        self.metric_bounds.insert(metric.into(), (min, max));
        self
    }

    fn bounds_for(&self, metric: &str) -> Option<(f64, f64)> {
        self.metric_bounds.get(metric).copied().or(self.bounds)
    }

    fn fit(samples: &[&Sample], horizon_seconds: u64) -> (f64, f64) {
        let origin = samples[0].timestamp;
        let points: Vec<(f64, f64)> = samples
            .iter()
            .map(|s| ((s.timestamp - origin).num_milliseconds() as f64 / 1000.0, s.value))
            .collect();

        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

        let var_x: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
        let cov: f64 = points.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();

        let slope = if var_x > 0.0 { cov / var_x } else { 0.0 };
        let intercept = mean_y - slope * mean_x;

        let ss_tot: f64 = points.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
        let ss_res: f64 = points
            .iter()
            .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
            .sum();
        let r_squared = if ss_tot > 0.0 { (1.0 - ss_res / ss_tot).clamp(0.0, 1.0) } else { 1.0 };

        let last_x = points.last().map_or(0.0, |(x, _)| *x);
        let predicted = intercept + slope * (last_x + horizon_seconds as f64);
        (predicted, r_squared)
    }
}

#[async_trait]
impl Forecaster for LinearTrendForecaster {
    fn name(&self) -> &str {
        "linear_trend"
    }

    fn min_history(&self) -> usize {
        self.min_history
    }

    async fn predict(
        &self,
        history: &[Sample],
        horizon_seconds: u64,
        cancel: &CancellationToken,
    ) -> ForecasterResult<ForecastResult> {
        if cancel.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }

        let grouped = group_history(history, self.min_history)?;

        let mut predicted_values = BTreeMap::new();
        let mut fit_total = 0.0;
        for (metric, samples) in &grouped {
            let (mut predicted, r_squared) = Self::fit(samples, horizon_seconds);
            if let Some((min, max)) = self.bounds_for(metric) {
                predicted = predicted.clamp(min, max);
            }
            if !predicted.is_finite() {
                return Err(ForecastError::Failed {
                    reason: format!("non-finite prediction for {}", metric),
                });
            }
            predicted_values.insert(metric.to_string(), predicted);
            fit_total += r_squared;
        }

        let confidence = (fit_total / grouped.len() as f64 * 100.0).clamp(0.0, 100.0);

        Ok(ForecastResult {
            predicted_values,
            confidence,
            horizon_seconds,
            generated_at: Utc::now(),
        })
    }
}
