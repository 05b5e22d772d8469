use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use aurora_engine::error::{SourceError, SourceResult};
use aurora_engine::{MetricSource, Sample};

/// Deterministic metric source.
///
/// Call `n` returns `values[n]` (the last value once the script runs out),
/// stamped `n * step` after a fixed epoch so forecasts do not depend on the
/// wall clock.
pub struct ScriptedSource {
    name: String,
    values: Vec<f64>,
    step: chrono::Duration,
    epoch: DateTime<Utc>,
    delay: Duration,
    failing_calls: HashSet<usize>,
    always_fail: bool,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: &str, values: &[f64]) -> Self {
        Self {
            name: name.to_string(),
            values: if values.is_empty() { vec![0.0] } else { values.to_vec() },
            step: chrono::Duration::seconds(10),
            epoch: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            delay: Duration::ZERO,
            failing_calls: HashSet::new(),
            always_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Constant value on every call
    pub fn constant(name: &str, value: f64) -> Self {
        Self::new(name, &[value])
    }

    /// Time between consecutive sample timestamps
    pub fn with_step(mut self, step: chrono::Duration) -> Self {
        self.step = step;
        self
    }

    /// Sleep before answering, honouring cancellation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the given zero-based calls with `SourceError::Unavailable`
    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.failing_calls.extend(calls.iter().copied());
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<dyn MetricSource> {
        Arc::new(self)
    }
}

#[async_trait]
impl MetricSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sample(&self, cancel: &CancellationToken) -> SourceResult<Sample> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => {
                    return Err(SourceError::Cancelled { source_name: self.name.clone() });
                }
            }
        }

        if self.always_fail || self.failing_calls.contains(&call) {
            return Err(SourceError::Unavailable {
                source_name: self.name.clone(),
                reason: format!("scripted failure on call {}", call),
            });
        }

        let value = self.values[call.min(self.values.len() - 1)];
        let timestamp = self.epoch + self.step * call as i32;
        Ok(Sample::at(self.name.clone(), value, timestamp))
    }
}

/// Factory for common source sets
pub struct MockSourceFactory;

impl MockSourceFactory {
    /// cpu, memory and disk at fixed values
    pub fn resources(cpu: f64, memory: f64, disk: f64) -> Vec<Arc<dyn MetricSource>> {
        vec![
            ScriptedSource::constant("cpu", cpu).into_arc(),
            ScriptedSource::constant("memory", memory).into_arc(),
            ScriptedSource::constant("disk", disk).into_arc(),
        ]
    }

    /// One source per metric, each following the given script
    pub fn scripted(scripts: &[(&str, &[f64])]) -> Vec<Arc<dyn MetricSource>> {
        scripts
            .iter()
            .map(|(name, values)| ScriptedSource::new(name, values).into_arc())
            .collect()
    }
}
