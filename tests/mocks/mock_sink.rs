use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use aurora_engine::error::SinkResult;
use aurora_engine::{
    AlertEvent, AlertKind, Diagnostic, DiagnosticKind, EngineEvent, ForecastResult, HealthReport, OutputSink,
};

/// Sink keeping every event in memory
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().await.clone()
    }

    pub async fn alerts(&self, kind: AlertKind) -> Vec<AlertEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Alert(alert) if alert.kind == kind => Some(alert.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn diagnostics(&self, kind: DiagnosticKind) -> Vec<Diagnostic> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Diagnostic(d) if d.kind == kind => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn health_reports(&self) -> Vec<HealthReport> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Health(report) => Some(report.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn forecasts(&self) -> Vec<ForecastResult> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Forecast(forecast) => Some(forecast.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn emit(&self, event: EngineEvent) -> SinkResult<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

/// Sink that takes `delay` per event before recording it
#[derive(Clone)]
pub struct SlowSink {
    delay: Duration,
    inner: RecordingSink,
}

impl SlowSink {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: RecordingSink::new(),
        }
    }

    /// Events that made it through before their emit timed out
    pub fn recorded(&self) -> &RecordingSink {
        &self.inner
    }
}

#[async_trait]
impl OutputSink for SlowSink {
    async fn emit(&self, event: EngineEvent) -> SinkResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.emit(event).await
    }
}
