//! Prometheus counters for the monitoring engine
//!
//! With the `metrics` feature disabled every recording call is a no-op and
//! [`EngineMetrics::gather_text`] returns an empty string.

#[cfg(feature = "metrics")]
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::Result;
#[cfg(feature = "metrics")]
use crate::error::MonitorError;

/// Engine performance counters
#[derive(Clone)]
pub struct EngineMetrics {
    #[cfg(feature = "metrics")]
    inner: Counters,
}

#[cfg(feature = "metrics")]
#[derive(Clone)]
struct Counters {
    registry: Registry,
    ticks_completed: IntCounter,
    ticks_skipped: IntCounter,
    alerts_emitted: IntCounterVec,
    source_failures: IntCounterVec,
    forecasts_completed: IntCounter,
    forecast_failures: IntCounter,
    sink_timeouts: IntCounter,
    tick_duration: Histogram,
}

#[cfg(feature = "metrics")]
fn register_err(e: prometheus::Error) -> MonitorError {
    MonitorError::Metrics(e.to_string())
}

impl EngineMetrics {
    #[cfg(feature = "metrics")]
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let ticks_completed = IntCounter::new("aurora_ticks_completed_total", "Ticks processed to completion")
            .map_err(register_err)?;
        let ticks_skipped = IntCounter::new("aurora_ticks_skipped_total", "Ticks skipped because the previous tick overran")
            .map_err(register_err)?;
        let alerts_emitted = IntCounterVec::new(
            Opts::new("aurora_alerts_emitted_total", "Alerts emitted by kind and severity"),
            &["kind", "severity"],
        )
        .map_err(register_err)?;
        let source_failures = IntCounterVec::new(
            Opts::new("aurora_source_failures_total", "Failed or timed out source reads"),
            &["source"],
        )
        .map_err(register_err)?;
        let forecasts_completed = IntCounter::new("aurora_forecasts_completed_total", "Successful forecasts")
            .map_err(register_err)?;
        let forecast_failures = IntCounter::new("aurora_forecast_failures_total", "Failed forecasts")
            .map_err(register_err)?;
        let sink_timeouts = IntCounter::new("aurora_sink_timeouts_total", "Events dropped after a sink timeout")
            .map_err(register_err)?;
        let tick_duration = Histogram::with_opts(
            HistogramOpts::new("aurora_tick_duration_seconds", "Time spent processing one tick")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        )
        .map_err(register_err)?;

        registry.register(Box::new(ticks_completed.clone())).map_err(register_err)?;
        registry.register(Box::new(ticks_skipped.clone())).map_err(register_err)?;
        registry.register(Box::new(alerts_emitted.clone())).map_err(register_err)?;
        registry.register(Box::new(source_failures.clone())).map_err(register_err)?;
        registry.register(Box::new(forecasts_completed.clone())).map_err(register_err)?;
        registry.register(Box::new(forecast_failures.clone())).map_err(register_err)?;
        registry.register(Box::new(sink_timeouts.clone())).map_err(register_err)?;
        registry.register(Box::new(tick_duration.clone())).map_err(register_err)?;

        Ok(Self {
            inner: Counters {
                registry,
                ticks_completed,
                ticks_skipped,
                alerts_emitted,
                source_failures,
                forecasts_completed,
                forecast_failures,
                sink_timeouts,
                tick_duration,
            },
        })
    }

    #[cfg(not(feature = "metrics"))]
    pub fn new() -> Result<Self> {
        Ok(Self {})
    }

    pub fn record_tick(&self, seconds: f64) {
        #[cfg(feature = "metrics")]
        {
            self.inner.ticks_completed.inc();
            self.inner.tick_duration.observe(seconds);
        }
        #[cfg(not(feature = "metrics"))]
        let _ = seconds;
    }

    pub fn record_skipped_tick(&self) {
        #[cfg(feature = "metrics")]
        self.inner.ticks_skipped.inc();
    }

    pub fn record_alert(&self, kind: &str, severity: &str) {
        #[cfg(feature = "metrics")]
        self.inner.alerts_emitted.with_label_values(&[kind, severity]).inc();
        #[cfg(not(feature = "metrics"))]
        let _ = (kind, severity);
    }

    pub fn record_source_failure(&self, source: &str) {
        #[cfg(feature = "metrics")]
        self.inner.source_failures.with_label_values(&[source]).inc();
        #[cfg(not(feature = "metrics"))]
        let _ = source;
    }

    pub fn record_forecast(&self, succeeded: bool) {
        #[cfg(feature = "metrics")]
        {
            if succeeded {
                self.inner.forecasts_completed.inc();
            } else {
                self.inner.forecast_failures.inc();
            }
        }
        #[cfg(not(feature = "metrics"))]
        let _ = succeeded;
    }

    pub fn record_sink_timeout(&self) {
        #[cfg(feature = "metrics")]
        self.inner.sink_timeouts.inc();
    }

    /// Render all counters in the Prometheus text exposition format
    #[cfg(feature = "metrics")]
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(register_err)?;
        String::from_utf8(buffer).map_err(|e| MonitorError::Metrics(e.to_string()))
    }

    #[cfg(not(feature = "metrics"))]
    pub fn gather_text(&self) -> Result<String> {
        Ok(String::new())
    }
}
