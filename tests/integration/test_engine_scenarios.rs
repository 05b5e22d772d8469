use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use aurora_engine::{
    AlertKind, Comparator, DiagnosticKind, Engine, EngineConfig, EngineStatus, HealthStatus, MetricSource,
    Severity, Threshold,
};

use crate::mocks::{MockSourceFactory, RecordingSink, ScriptedSource, SlowSink};

fn scenario_config(thresholds: Vec<Threshold>) -> EngineConfig {
    let mut config = EngineConfig::development();
    config.sources.clear();
    config.scheduling.interval_ms = 1000;
    config.alerting.thresholds = thresholds;
    config.alerting.critical_margin = 10.0;
    config
}

fn cpu_over_80() -> Vec<Threshold> {
    vec![Threshold::new("cpu", Comparator::Gt, 80.0)]
}

/// cpu 95 against GT 80 with a margin of 10 raises one critical alert
#[tokio::test]
async fn test_cpu_over_threshold_scenario() -> Result<()> {
    crate::init_test_environment();
    let sink = RecordingSink::new();
    let sources = vec![ScriptedSource::constant("cpu", 95.0).into_arc()];
    let engine = Engine::new(scenario_config(cpu_over_80()), sources, None, Arc::new(sink.clone()))?;

    let report = engine.run_once().await?;

    let alerts = sink.alerts(AlertKind::Realtime).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].metric, "cpu");
    assert_eq!(alerts[0].observed_value, 95.0);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(report.status, HealthStatus::Critical);
    Ok(())
}

/// Inside the margin the same violation is only a warning
#[tokio::test]
async fn test_violation_within_margin_is_warning() -> Result<()> {
    let sink = RecordingSink::new();
    let sources = vec![ScriptedSource::constant("cpu", 85.0).into_arc()];
    let engine = Engine::new(scenario_config(cpu_over_80()), sources, None, Arc::new(sink.clone()))?;

    let report = engine.run_once().await?;

    let alerts = sink.alerts(AlertKind::Realtime).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Warn);
    assert_eq!(report.status, HealthStatus::Warning);
    Ok(())
}

/// Metrics without a threshold are sampled but never alert
#[tokio::test]
async fn test_unthresholded_metric_is_ignored() -> Result<()> {
    let sink = RecordingSink::new();
    let sources = MockSourceFactory::scripted(&[("cpu", &[95.0][..]), ("memory", &[10.0][..])]);
    let engine = Engine::new(scenario_config(cpu_over_80()), sources, None, Arc::new(sink.clone()))?;

    let report = engine.run_once().await?;

    assert_eq!(sink.alerts(AlertKind::Realtime).await.len(), 1);
    assert!(sink.diagnostics(DiagnosticKind::Other).await.is_empty());
    assert_eq!(report.samples.len(), 2);
    assert_eq!(engine.history_len("memory").await, 1);
    Ok(())
}

/// A failing source degrades its tick and recovers on the next one
#[tokio::test]
async fn test_source_failure_recovers_next_tick() -> Result<()> {
    let sink = RecordingSink::new();
    let sources: Vec<Arc<dyn MetricSource>> = vec![
        ScriptedSource::constant("cpu", 40.0).into_arc(),
        ScriptedSource::constant("disk", 50.0).failing_on(&[0]).into_arc(),
    ];
    let engine = Engine::new(scenario_config(cpu_over_80()), sources, None, Arc::new(sink.clone()))?;

    let first = engine.run_once().await?;
    assert_eq!(first.status, HealthStatus::Degraded);
    assert_eq!(first.degraded.len(), 1);
    assert_eq!(first.degraded[0].source, "disk");

    let second = engine.run_once().await?;
    assert_eq!(second.status, HealthStatus::Healthy);
    assert_eq!(second.samples.len(), 2);

    let unavailable = sink.diagnostics(DiagnosticKind::SourceUnavailable).await;
    assert_eq!(unavailable.len(), 1);
    assert_eq!(unavailable[0].tick, Some(first.tick));
    Ok(())
}

/// A tick that outlasts the interval causes exactly one skipped tick
#[tokio::test(start_paused = true)]
async fn test_overlapping_tick_is_skipped_once() -> Result<()> {
    let sink = RecordingSink::new();
    let sources = vec![ScriptedSource::constant("cpu", 10.0)
        .with_delay(Duration::from_millis(1500))
        .into_arc()];
    let mut engine = Engine::new(scenario_config(cpu_over_80()), sources, None, Arc::new(sink.clone()))?;

    // Tick 1 runs 0..1500, tick 2 is due at 1000 and skipped, tick 3 starts at 2000
    engine.start().await?;
    tokio::time::sleep(Duration::from_millis(2600)).await;
    engine.stop().await?;

    let overruns = sink.diagnostics(DiagnosticKind::TickOverrun).await;
    assert_eq!(overruns.len(), 1);
    assert_eq!(overruns[0].tick, Some(2));
    assert_eq!(sink.health_reports().await.len(), 1);
    Ok(())
}

/// A sink slower than the emit timeout costs each event at most the timeout
#[tokio::test(start_paused = true)]
async fn test_slow_sink_is_bounded() -> Result<()> {
    let sink = SlowSink::new(Duration::from_secs(30));
    let mut config = scenario_config(cpu_over_80());
    config.sink.timeout_ms = 100;
    let sources = vec![ScriptedSource::constant("cpu", 95.0).into_arc()];
    let engine = Engine::new(config, sources, None, Arc::new(sink.clone()))?;

    let started = tokio::time::Instant::now();
    let report = engine.run_once().await?;

    // one alert and one health report, each abandoned after 100ms
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(report.alert_count, 1);
    assert!(sink.recorded().events().await.is_empty());
    Ok(())
}

/// The history never grows past its capacity however long the engine runs
#[tokio::test(start_paused = true)]
async fn test_history_capacity_over_many_ticks() -> Result<()> {
    let sink = RecordingSink::new();
    let mut config = scenario_config(cpu_over_80());
    config.scheduling.interval_ms = 10;
    config.history.capacity = 5;
    let sources = MockSourceFactory::resources(10.0, 20.0, 30.0);
    let mut engine = Engine::new(config, sources, None, Arc::new(sink.clone()))?;

    engine.start().await?;
    tokio::time::sleep(Duration::from_millis(1000)).await;
    engine.stop().await?;

    for metric in ["cpu", "memory", "disk"] {
        assert_eq!(engine.history_len(metric).await, 5);
    }
    assert_eq!(engine.history_snapshot().await.len(), 15);
    assert!(engine.get_status().await.stats.ticks_completed >= 50);
    Ok(())
}

/// Stopping the engine cancels reads that would otherwise take an hour
#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_in_flight_tick() -> Result<()> {
    let sink = RecordingSink::new();
    let mut config = scenario_config(Vec::new());
    config.scheduling.source_timeout_ms = 10_000_000;
    let slow = Arc::new(ScriptedSource::constant("cpu", 10.0).with_delay(Duration::from_secs(3600)));
    let sources: Vec<Arc<dyn MetricSource>> = vec![slow.clone()];
    let mut engine = Engine::new(config, sources, None, Arc::new(sink.clone()))?;

    engine.start().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(slow.calls(), 1);

    let started = tokio::time::Instant::now();
    engine.stop().await?;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(engine.get_status().await.status, EngineStatus::Stopped);
    assert!(sink.health_reports().await.is_empty());
    assert!(sink.diagnostics(DiagnosticKind::SourceUnavailable).await.is_empty());
    Ok(())
}

/// The engine can be started again after a stop
#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() -> Result<()> {
    let sink = RecordingSink::new();
    let sources = vec![ScriptedSource::constant("cpu", 10.0).into_arc()];
    let mut engine = Engine::new(scenario_config(cpu_over_80()), sources, None, Arc::new(sink.clone()))?;

    engine.start().await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    engine.stop().await?;

    engine.start().await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    engine.stop().await?;

    let ticks: Vec<u64> = sink.health_reports().await.iter().map(|r| r.tick).collect();
    assert_eq!(ticks, vec![1, 2]);
    Ok(())
}
