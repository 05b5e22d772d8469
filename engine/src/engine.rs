//! Core monitoring engine
//!
//! The engine owns the tick loop. Every tick samples all registered sources
//! through a bounded pool, evaluates thresholds, appends to the history,
//! optionally forecasts, and reports everything to the output sink. Ticks do
//! not overlap unless the configuration allows it; a tick that comes due
//! while another is still processing is skipped and reported as an overrun.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use tokio::signal;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{validate_threshold_coverage, EngineConfig};
use crate::error::{ConfigError, ForecastError, MonitorError, Result, SinkError, SourceError, SourceResult};
use crate::evaluator::ThresholdEvaluator;
use crate::forecast::{Forecaster, LinearTrendForecaster};
use crate::history::HistoryBuffer;
use crate::metrics::EngineMetrics;
use crate::sink::{emit_bounded, OutputSink};
use crate::source::{build_sources, MetricSource};
use crate::types::{
    AlertEvent, AlertKind, DegradedReading, Diagnostic, EngineEvent, HealthReport, Sample, Severity,
};

/// No tick is processing
const IDLE: u64 = 0;

/// Periodic health monitoring engine
pub struct Engine {
    core: Arc<EngineCore>,

    /// Cancellation for the current run
    cancel: CancellationToken,

    /// Scheduling loop task
    handle: Option<JoinHandle<()>>,
}

/// Engine state
#[derive(Debug, Clone)]
pub struct EngineState {
    /// Engine status
    pub status: EngineStatus,

    /// When the current run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the last tick completed
    pub last_tick: Option<DateTime<Utc>>,

    /// Tick statistics
    pub stats: TickStats,
}

/// Engine status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Stopped,
    Running,
    Stopping,
}

/// Tick statistics
#[derive(Debug, Clone, Default)]
pub struct TickStats {
    /// Ticks processed to completion
    pub ticks_completed: u64,

    /// Ticks skipped because the previous tick overran
    pub ticks_skipped: u64,

    /// Real-time alerts emitted
    pub realtime_alerts: u64,

    /// Predictive alerts emitted
    pub predictive_alerts: u64,

    /// Failed or timed out source reads
    pub source_failures: u64,

    /// Successful forecasts
    pub forecasts_completed: u64,

    /// Failed forecasts
    pub forecast_failures: u64,

    /// Average tick processing time
    pub avg_tick_duration: Duration,
}

/// Everything a tick needs, shared between the loop and its tick tasks
struct EngineCore {
    config: EngineConfig,
    sources: Vec<Arc<dyn MetricSource>>,
    evaluator: ThresholdEvaluator,
    forecaster: Option<Arc<dyn Forecaster>>,
    sink: Arc<dyn OutputSink>,
    history: RwLock<HistoryBuffer>,
    pool: Arc<Semaphore>,
    metrics: EngineMetrics,
    state: RwLock<EngineState>,
    last_forecast: Mutex<Option<Instant>>,
    next_tick: AtomicU64,
    running_tick: AtomicU64,
}

impl Engine {
    /// Create an engine from explicit collaborators. Validation failures
    /// are the only fatal errors and are returned before anything runs.
    pub fn new(
        config: EngineConfig,
        sources: Vec<Arc<dyn MetricSource>>,
        forecaster: Option<Arc<dyn Forecaster>>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self> {
        validate_setup(&config, &sources, forecaster.is_some())?;

        let core = EngineCore {
            evaluator: ThresholdEvaluator::new(config.alerting.thresholds.clone(), config.alerting.critical_margin),
            history: RwLock::new(HistoryBuffer::new(config.history.capacity)),
            pool: Arc::new(Semaphore::new(config.scheduling.max_concurrent_sources)),
            metrics: EngineMetrics::new()?,
            state: RwLock::new(EngineState {
                status: EngineStatus::Stopped,
                started_at: None,
                last_tick: None,
                stats: TickStats::default(),
            }),
            last_forecast: Mutex::new(None),
            next_tick: AtomicU64::new(1),
            running_tick: AtomicU64::new(IDLE),
            config,
            sources,
            forecaster,
            sink,
        };

        Ok(Self {
            core: Arc::new(core),
            cancel: CancellationToken::new(),
            handle: None,
        })
    }

    /// Create an engine whose sources come from `config.sources` and whose
    /// forecaster, when enabled, is a [`LinearTrendForecaster`] clamped to
    /// each source's value range
    pub fn from_config(config: EngineConfig, sink: Arc<dyn OutputSink>) -> Result<Self> {
        let sources = build_sources(&config.sources);
        let forecaster: Option<Arc<dyn Forecaster>> = if config.forecasting.enabled {
            let forecaster = config
                .sources
                .iter()
                .filter_map(|spec| spec.value_range().map(|(min, max)| (spec.name(), min, max)))
                .fold(LinearTrendForecaster::new(config.forecasting.min_history), |f, (metric, min, max)| {
                    f.with_metric_bounds(metric, min, max)
                });
            Some(Arc::new(forecaster))
        } else {
            None
        };
        Self::new(config, sources, forecaster, sink)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Names of the registered sources, in registration order
    pub fn source_names(&self) -> Vec<String> {
        self.core.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Start the scheduling loop
    pub async fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(MonitorError::Engine("engine is already running".to_string()));
        }

        {
            let mut state = self.core.state.write().await;
            state.status = EngineStatus::Running;
            state.started_at = Some(Utc::now());
        }

        self.cancel = CancellationToken::new();
        let core = self.core.clone();
        let cancel = self.cancel.clone();
        self.handle = Some(tokio::spawn(async move { core.run_loop(cancel).await }));

        info!(
            profile = %self.core.config.profile,
            interval_ms = self.core.config.scheduling.interval_ms,
            sources = self.core.sources.len(),
            "Monitoring engine started"
        );
        Ok(())
    }

    /// Stop the loop, cancelling any in-flight source or forecast call
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping monitoring engine");

        {
            let mut state = self.core.state.write().await;
            state.status = EngineStatus::Stopping;
        }

        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| MonitorError::Engine(format!("scheduling loop failed: {}", e)))?;
        }

        {
            let mut state = self.core.state.write().await;
            state.status = EngineStatus::Stopped;
        }

        info!("Monitoring engine stopped");
        Ok(())
    }

    /// Get engine state
    pub async fn get_status(&self) -> EngineState {
        self.core.state.read().await.clone()
    }

    /// Run one tick immediately, outside the schedule. Fails with
    /// [`MonitorError::TickOverrun`] if a tick is already processing and
    /// overlap is not allowed.
    pub async fn run_once(&self) -> Result<HealthReport> {
        let tick = self.core.next_tick.fetch_add(1, Ordering::SeqCst);
        if !self.core.claim_tick(tick) {
            return Err(MonitorError::TickOverrun {
                skipped_tick: tick,
                running_tick: self.core.running_tick.load(Ordering::SeqCst),
            });
        }

        let claim = TickClaim { core: self.core.clone(), tick };
        let report = claim.core.run_tick(tick, Instant::now(), &self.cancel).await;
        drop(claim);

        report.ok_or_else(|| MonitorError::Engine(format!("tick {} was cancelled", tick)))
    }

    /// Read-only copy of the sample history, oldest first
    pub async fn history_snapshot(&self) -> Vec<Sample> {
        self.core.history.read().await.snapshot()
    }

    /// Samples currently held for `metric`
    pub async fn history_len(&self, metric: &str) -> usize {
        self.core.history.read().await.len(metric)
    }

    /// Prometheus text rendering of the engine counters
    pub fn metrics_text(&self) -> Result<String> {
        self.core.metrics.gather_text()
    }

    /// Wait for shutdown signal
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Processing claim on a tick, released on drop so that a panicking tick
/// does not hold the slot
struct TickClaim {
    core: Arc<EngineCore>,
    tick: u64,
}

impl Drop for TickClaim {
    fn drop(&mut self) {
        self.core.release_tick(self.tick);
    }
}

/// Startup checks on top of [`EngineConfig::validate`], run against the
/// collaborators actually registered
fn validate_setup(config: &EngineConfig, sources: &[Arc<dyn MetricSource>], has_forecaster: bool) -> Result<()> {
    config.validate()?;

    if sources.is_empty() {
        return Err(ConfigError::ValidationFailed {
            reason: "at least one metric source must be registered".to_string(),
        }
        .into());
    }

    let mut names = HashSet::new();
    for source in sources {
        if !names.insert(source.name()) {
            return Err(ConfigError::DuplicateSource { name: source.name().to_string() }.into());
        }
    }

    validate_threshold_coverage(&config.alerting.thresholds, sources.iter().map(|s| s.metric()))?;

    if config.forecasting.enabled && !has_forecaster {
        return Err(ConfigError::ValidationFailed {
            reason: "forecasting is enabled but no forecaster is registered".to_string(),
        }
        .into());
    }

    Ok(())
}

impl EngineCore {
    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Tick task failed: {}", e);
                    }
                }

                scheduled = ticker.tick() => {
                    let tick = self.next_tick.fetch_add(1, Ordering::SeqCst);

                    if !self.claim_tick(tick) {
                        self.report_overrun(tick).await;
                        continue;
                    }

                    let claim = TickClaim { core: self.clone(), tick };
                    let cancel = cancel.clone();
                    in_flight.spawn(async move {
                        claim.core.run_tick(claim.tick, scheduled, &cancel).await;
                    });
                }
            }
        }

        debug!(in_flight = in_flight.len(), "Scheduling loop cancelled, draining ticks");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Tick task failed: {}", e);
            }
        }
    }

    /// Mark `tick` as processing. Always succeeds when overlap is allowed.
    fn claim_tick(&self, tick: u64) -> bool {
        if self.config.scheduling.allow_overlap {
            self.running_tick.store(tick, Ordering::SeqCst);
            return true;
        }
        self.running_tick
            .compare_exchange(IDLE, tick, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn release_tick(&self, tick: u64) {
        let _ = self
            .running_tick
            .compare_exchange(tick, IDLE, Ordering::SeqCst, Ordering::SeqCst);
    }

    async fn report_overrun(&self, skipped_tick: u64) {
        let running_tick = self.running_tick.load(Ordering::SeqCst);
        self.metrics.record_skipped_tick();
        {
            let mut state = self.state.write().await;
            state.stats.ticks_skipped += 1;
        }
        self.report(Some(skipped_tick), MonitorError::TickOverrun { skipped_tick, running_tick })
            .await;
    }

    /// Process one tick. Returns `None` when shutdown abandoned it.
    async fn run_tick(&self, tick: u64, scheduled: Instant, cancel: &CancellationToken) -> Option<HealthReport> {
        let started = Instant::now();
        debug!(tick, "Tick started");

        let (samples, degraded) = self.collect(tick, cancel).await;
        if cancel.is_cancelled() {
            debug!(tick, "Tick abandoned on shutdown");
            return None;
        }

        let alerts = self.evaluator.evaluate(&samples);
        for alert in &alerts {
            self.publish_alert(alert).await;
        }

        self.history.write().await.extend(samples.iter().cloned());

        let predictive = if self.forecast_due(scheduled).await {
            self.forecast(tick, cancel).await
        } else {
            0
        };
        if cancel.is_cancelled() {
            debug!(tick, "Tick abandoned on shutdown");
            return None;
        }

        let duration = started.elapsed();
        let report = HealthReport {
            id: Uuid::new_v4(),
            tick,
            timestamp: Utc::now(),
            status: HealthReport::status_for(&alerts, &degraded),
            alert_count: alerts.len(),
            samples,
            degraded,
            duration_ms: duration.as_millis() as u64,
        };

        self.metrics.record_tick(duration.as_secs_f64());
        {
            let mut state = self.state.write().await;
            let stats = &mut state.stats;
            let completed = stats.ticks_completed;
            stats.avg_tick_duration = (stats.avg_tick_duration * completed as u32 + duration) / (completed as u32 + 1);
            stats.ticks_completed += 1;
            stats.realtime_alerts += alerts.len() as u64;
            stats.predictive_alerts += predictive as u64;
            stats.source_failures += report.degraded.len() as u64;
            state.last_tick = Some(report.timestamp);
        }

        self.emit(EngineEvent::Health(report.clone())).await;
        Some(report)
    }

    /// Sample every source through the worker pool and join the results
    async fn collect(&self, tick: u64, cancel: &CancellationToken) -> (Vec<Sample>, Vec<DegradedReading>) {
        let timeout = self.config.source_timeout();
        let reads = self.sources.iter().map(|source| {
            let pool = self.pool.clone();
            async move {
                let _permit = pool.acquire_owned().await.map_err(|_| SourceError::Unavailable {
                    source_name: source.name().to_string(),
                    reason: "worker pool closed".to_string(),
                })?;
                AssertUnwindSafe(read_source(source.as_ref(), timeout, cancel))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(SourceError::Unavailable {
                            source_name: source.name().to_string(),
                            reason: format!("source panicked: {}", panic_message(panic.as_ref())),
                        })
                    })
            }
        });
        let results: Vec<SourceResult<Sample>> = join_all(reads).await;

        let mut samples = Vec::with_capacity(results.len());
        let mut degraded = Vec::new();
        for result in results {
            match result {
                Ok(sample) if sample.value.is_finite() => samples.push(sample),
                Ok(sample) => {
                    let error = SourceError::Unavailable {
                        reason: format!("non-finite reading {}", sample.value),
                        source_name: sample.name,
                    };
                    degraded.push(self.degrade(tick, error).await);
                }
                Err(SourceError::Cancelled { .. }) if cancel.is_cancelled() => {}
                Err(error) => degraded.push(self.degrade(tick, error).await),
            }
        }

        (samples, degraded)
    }

    async fn degrade(&self, tick: u64, error: SourceError) -> DegradedReading {
        self.metrics.record_source_failure(error.source_name());
        let reading = DegradedReading {
            source: error.source_name().to_string(),
            reason: error.to_string(),
        };
        self.report(Some(tick), error.into()).await;
        reading
    }

    /// Whether a forecast should run for a tick scheduled at `scheduled`.
    /// Claims the slot when it returns true.
    async fn forecast_due(&self, scheduled: Instant) -> bool {
        if !self.config.forecasting.enabled || self.forecaster.is_none() {
            return false;
        }

        let mut last = self.last_forecast.lock().await;
        match *last {
            Some(previous) if scheduled.saturating_duration_since(previous) < self.config.forecast_interval() => false,
            _ => {
                *last = Some(scheduled);
                true
            }
        }
    }

    /// Run the forecaster over the history and publish its outcome.
    /// Returns the number of predictive alerts emitted.
    async fn forecast(&self, tick: u64, cancel: &CancellationToken) -> usize {
        let Some(forecaster) = &self.forecaster else {
            return 0;
        };

        let history = self.history.read().await.snapshot();
        let horizon = self.config.forecasting.horizon_seconds;
        let timeout = self.config.forecast_timeout();

        let predict = AssertUnwindSafe(forecaster.predict(&history, horizon, cancel)).catch_unwind();
        let outcome = match tokio::time::timeout(timeout, predict).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => Err(ForecastError::Failed {
                reason: format!("forecaster panicked: {}", panic_message(panic.as_ref())),
            }),
            Err(_) => Err(ForecastError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(forecast) => {
                self.metrics.record_forecast(true);
                let alerts = self.evaluator.evaluate_forecast(&forecast);
                info!(
                    tick,
                    forecaster = forecaster.name(),
                    metrics = forecast.predicted_values.len(),
                    predictive_alerts = alerts.len(),
                    "Forecast completed"
                );

                self.emit(EngineEvent::Forecast(forecast)).await;
                for alert in &alerts {
                    self.publish_alert(alert).await;
                }

                let mut state = self.state.write().await;
                state.stats.forecasts_completed += 1;
                alerts.len()
            }
            Err(ForecastError::Cancelled) if cancel.is_cancelled() => 0,
            Err(error) => {
                self.metrics.record_forecast(false);
                {
                    let mut state = self.state.write().await;
                    state.stats.forecast_failures += 1;
                }
                self.report(Some(tick), error.into()).await;
                0
            }
        }
    }

    async fn publish_alert(&self, alert: &AlertEvent) {
        let kind = match alert.kind {
            AlertKind::Realtime => "realtime",
            AlertKind::Predictive => "predictive",
        };
        let severity = match alert.severity {
            Severity::Warn => "warn",
            Severity::Critical => "critical",
        };
        self.metrics.record_alert(kind, severity);
        self.emit(EngineEvent::Alert(alert.clone())).await;
    }

    /// Log a recoverable error and forward it to the sink as a diagnostic
    async fn report(&self, tick: Option<u64>, error: MonitorError) {
        let diagnostic = Diagnostic::from_error(tick, &error);
        warn!(tick = ?tick, category = error.category(), "{}", error);
        self.emit(EngineEvent::Diagnostic(diagnostic)).await;
    }

    /// Hand an event to the sink. Sink failures are logged, never re-emitted.
    async fn emit(&self, event: EngineEvent) {
        let kind = event.kind();
        match emit_bounded(self.sink.as_ref(), event, self.config.sink_timeout()).await {
            Ok(()) => {}
            Err(error @ SinkError::Timeout { .. }) => {
                self.metrics.record_sink_timeout();
                let error = MonitorError::from(error);
                warn!(event = kind, category = error.category(), "{}", error);
            }
            Err(error) => {
                let error = MonitorError::from(error);
                warn!(event = kind, category = error.category(), "{}", error);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// One bounded source read. A timeout is reported as the source being unavailable.
async fn read_source(source: &dyn MetricSource, timeout: Duration, cancel: &CancellationToken) -> SourceResult<Sample> {
    match tokio::time::timeout(timeout, source.sample(cancel)).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout {
            source_name: source.name().to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
