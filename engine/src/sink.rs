//! Output sinks for engine events
//!
//! Emission is fire-and-forget from the engine's point of view: every call is
//! wrapped in [`emit_bounded`] so a slow sink costs at most the configured
//! timeout and never stalls the scheduling loop.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::{SinkError, SinkResult};
use crate::types::{AlertKind, EngineEvent, HealthStatus, Severity};

/// Receives alerts, health reports, forecasts and diagnostics
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn emit(&self, event: EngineEvent) -> SinkResult<()>;
}

/// Emit `event`, giving up with [`SinkError::Timeout`] after `timeout`
pub async fn emit_bounded(sink: &dyn OutputSink, event: EngineEvent, timeout: Duration) -> SinkResult<()> {
    let event_kind = event.kind();
    match tokio::time::timeout(timeout, sink.emit(event)).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout {
            event_kind: event_kind.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Writes every event to the `tracing` subscriber
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

#[async_trait]
impl OutputSink for TracingSink {
    async fn emit(&self, event: EngineEvent) -> SinkResult<()> {
        match &event {
            EngineEvent::Alert(alert) => {
                let kind = match alert.kind {
                    AlertKind::Realtime => "realtime",
                    AlertKind::Predictive => "predictive",
                };
                match alert.severity {
                    Severity::Critical => error!(
                        metric = %alert.metric,
                        value = alert.observed_value,
                        threshold = %alert.threshold,
                        kind,
                        "CRITICAL alert"
                    ),
                    Severity::Warn => warn!(
                        metric = %alert.metric,
                        value = alert.observed_value,
                        threshold = %alert.threshold,
                        kind,
                        "Warning alert"
                    ),
                }
            }
            EngineEvent::Health(report) => {
                let readings = report
                    .samples
                    .iter()
                    .map(|s| format!("{}: {:.2}", s.name, s.value))
                    .collect::<Vec<_>>()
                    .join(" | ");
                let verdict = match report.status {
                    HealthStatus::Healthy => "System stable",
                    HealthStatus::Warning => "Resource utilization nearing limits",
                    HealthStatus::Critical => "Resource utilization critical",
                    HealthStatus::Degraded => "Some sources unavailable",
                };
                info!(
                    tick = report.tick,
                    status = ?report.status,
                    alerts = report.alert_count,
                    degraded = report.degraded.len(),
                    duration_ms = report.duration_ms,
                    "Health check: {} ({})",
                    readings,
                    verdict
                );
            }
            EngineEvent::Forecast(forecast) => {
                let predictions = forecast
                    .predicted_values
                    .iter()
                    .map(|(metric, value)| format!("{}: {:.2}", metric, value))
                    .collect::<Vec<_>>()
                    .join(" | ");
                info!(
                    horizon_seconds = forecast.horizon_seconds,
                    confidence = forecast.confidence,
                    "Forecast: {}",
                    predictions
                );
            }
            EngineEvent::Diagnostic(diagnostic) => {
                warn!(kind = ?diagnostic.kind, tick = ?diagnostic.tick, "{}", diagnostic.message);
            }
        }
        Ok(())
    }
}

/// Forwards events into a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn emit(&self, event: EngineEvent) -> SinkResult<()> {
        self.tx.send(event).await.map_err(|_| SinkError::Closed)
    }
}
