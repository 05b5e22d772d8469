use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use aurora_engine::error::{ForecastError, ForecasterResult};
use aurora_engine::forecast::group_history;
use aurora_engine::{ForecastResult, Forecaster, Sample};

/// Forecaster returning fixed predictions once enough history exists
pub struct MockForecaster {
    min_history: usize,
    predictions: BTreeMap<String, f64>,
    confidence: f64,
    delay: Duration,
    calls: AtomicUsize,
    history_seen: AtomicUsize,
}

impl MockForecaster {
    pub fn new(min_history: usize) -> Self {
        Self {
            min_history,
            predictions: BTreeMap::new(),
            confidence: 75.0,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            history_seen: AtomicUsize::new(0),
        }
    }

    pub fn predicting(mut self, metric: &str, value: f64) -> Self {
        self.predictions.insert(metric.to_string(), value);
        self
    }

    /// Sleep before answering, honouring cancellation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Length of the history passed to the most recent call
    pub fn last_history_len(&self) -> usize {
        self.history_seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Forecaster for MockForecaster {
    fn name(&self) -> &str {
        "mock"
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.history_seen.store(history.len(), Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => return Err(ForecastError::Cancelled),
            }
        }

        group_history(history, self.min_history)?;

        Ok(ForecastResult {
            predicted_values: self.predictions.clone(),
            confidence: self.confidence,
            horizon_seconds,
            generated_at: Utc::now(),
        })
    }
}
