use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use tempfile::TempDir;

use aurora_engine::config::{FORECASTING_ENV, INTERVAL_ENV, PROFILE_ENV};
use aurora_engine::{ConfigError, Engine, EngineConfig, MonitorError, SourceSpec};

use crate::mocks::RecordingSink;

/// Serializes tests that touch process environment variables
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_guard() -> MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    for key in [PROFILE_ENV, INTERVAL_ENV, FORECASTING_ENV] {
        std::env::remove_var(key);
    }
    guard
}

#[test]
fn test_profile_selected_by_environment() {
    let _guard = env_guard();
    std::env::set_var(PROFILE_ENV, "experimental");

    let config = EngineConfig::from_env().unwrap();
    assert_eq!(config.profile, "experimental");
    assert_eq!(config.scheduling.interval_ms, 25000);
    assert!(config.forecasting.enabled);

    std::env::remove_var(PROFILE_ENV);
    let config = EngineConfig::from_env().unwrap();
    assert_eq!(config.profile, "development");
    assert_eq!(config.scheduling.interval_ms, 7000);
}

#[test]
fn test_unknown_profile_is_configuration_error() {
    let _guard = env_guard();
    std::env::set_var(PROFILE_ENV, "production");

    let error = MonitorError::from(EngineConfig::from_env().unwrap_err());
    assert!(error.is_critical());
    assert!(!error.is_recoverable());
    assert_eq!(error.category(), "configuration");

    std::env::remove_var(PROFILE_ENV);
}

#[test]
fn test_environment_overrides() {
    let _guard = env_guard();
    std::env::set_var(PROFILE_ENV, "development");
    std::env::set_var(INTERVAL_ENV, "1500");
    std::env::set_var(FORECASTING_ENV, "true");

    let config = EngineConfig::from_env().unwrap();
    assert_eq!(config.scheduling.interval_ms, 1500);
    assert!(config.forecasting.enabled);

    std::env::set_var(INTERVAL_ENV, "soon");
    assert!(matches!(
        EngineConfig::from_env(),
        Err(ConfigError::InvalidValue { ref field, .. }) if field == INTERVAL_ENV
    ));

    std::env::set_var(INTERVAL_ENV, "0");
    assert!(EngineConfig::from_env().is_err());

    for key in [PROFILE_ENV, INTERVAL_ENV, FORECASTING_ENV] {
        std::env::remove_var(key);
    }
}

#[test]
fn test_config_file_with_custom_sources() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("aurora").join("monitor.toml");

    let mut config = EngineConfig::simulation();
    config.profile = "custom".to_string();
    config.sources.push(SourceSpec::Availability {
        name: "cloud.aws.availability".to_string(),
        healthy_probability: 1.0,
    });
    config.save_to_file(&path)?;

    let loaded = EngineConfig::from_file(&path)?;
    assert_eq!(loaded, config);
    assert_eq!(loaded.sources.len(), 4);
    Ok(())
}

#[test]
fn test_config_file_rejects_unknown_metric() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("monitor.toml");
    let mut config = EngineConfig::simulation();
    config.sources.retain(|s| s.name() != "disk");
    std::fs::write(&path, toml::to_string_pretty(&config)?)?;

    assert_eq!(
        EngineConfig::from_file(&path).unwrap_err(),
        ConfigError::UnknownMetric { metric: "disk".to_string() }
    );
    Ok(())
}

/// A profile's declared sources are what the engine registers
#[tokio::test]
async fn test_engine_from_simulation_profile() -> Result<()> {
    let sink = RecordingSink::new();
    let mut config = EngineConfig::simulation();
    for source in &mut config.sources {
        if let SourceSpec::Simulated { failure_rate, .. } = source {
            *failure_rate = 0.0;
        }
    }
    let engine = Engine::from_config(config, Arc::new(sink.clone()))?;
    assert_eq!(engine.source_names(), vec!["cpu", "memory", "disk"]);

    let report = engine.run_once().await?;
    assert_eq!(report.samples.len(), 3);
    assert!(report.degraded.is_empty());
    assert!(report.samples.iter().all(|s| (0.0..100.0).contains(&s.value)));
    assert_eq!(sink.health_reports().await.len(), 1);
    Ok(())
}

#[test]
fn test_experimental_profile_covers_cloud_providers() {
    let config = EngineConfig::experimental();
    for provider in ["aws", "azure", "gcp", "digitalocean"] {
        let metric = format!("cloud.{}.availability", provider);
        assert!(config.sources.iter().any(|s| s.name() == metric));
        assert!(config.alerting.thresholds.iter().any(|t| t.metric == metric));
    }
}
