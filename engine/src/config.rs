//! Configuration management for the Aurora monitoring engine
//!
//! An [`EngineConfig`] is built once at startup, from a named profile, a TOML
//! file, or both, with a handful of environment overrides on top. It is
//! validated before the engine starts and never mutated afterwards.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::source::{SourceSpec, SystemResource};
use crate::types::{Comparator, Threshold};

/// Environment variable selecting the configuration profile
pub const PROFILE_ENV: &str = "MONITOR_ENV";

/// Environment variable overriding the tick interval
pub const INTERVAL_ENV: &str = "MONITOR_INTERVAL_MS";

/// Environment variable toggling forecasting
pub const FORECASTING_ENV: &str = "MONITOR_FORECASTING";

/// Profile used when none is selected
pub const DEFAULT_PROFILE: &str = "development";

/// Names of the built-in profiles
pub const PROFILES: &[&str] = &["development", "experimental", "simulation"];

/// Cloud providers probed by the experimental profile
const CLOUD_PROVIDERS: &[&str] = &["aws", "azure", "gcp", "digitalocean"];

/// Main configuration structure for the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile this configuration was derived from
    pub profile: String,

    /// Tick scheduling
    pub scheduling: SchedulingConfig,

    /// Threshold alerting
    pub alerting: AlertingConfig,

    /// Forecasting
    pub forecasting: ForecastingConfig,

    /// Sample history retention
    pub history: HistoryConfig,

    /// Output sink behaviour
    pub sink: SinkConfig,

    /// Logging
    pub logging: LoggingConfig,

    /// Metric sources to register
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
}

/// Scheduling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Tick interval in milliseconds
    pub interval_ms: u64,

    /// Let a tick start while the previous one is still processing
    pub allow_overlap: bool,

    /// Upper bound on concurrent source reads within one tick
    pub max_concurrent_sources: usize,

    /// Per-source sampling timeout in milliseconds
    pub source_timeout_ms: u64,
}

/// Alerting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertingConfig {
    /// How far past its limit a value must be to count as critical
    pub critical_margin: f64,

    /// Thresholds, evaluated in order
    pub thresholds: Vec<Threshold>,
}

/// Forecasting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastingConfig {
    /// Enable forecasting
    pub enabled: bool,

    /// Forecast cadence in milliseconds
    pub interval_ms: u64,

    /// How far ahead to predict, in seconds
    pub horizon_seconds: u64,

    /// Samples per metric required before predicting
    pub min_history: usize,

    /// Forecast call timeout in milliseconds
    pub timeout_ms: u64,
}

/// History configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Samples retained per metric
    pub capacity: usize,
}

/// Sink configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Maximum time a single emit may take, in milliseconds
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Emit JSON log lines
    pub json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 7000,
            allow_overlap: false,
            max_concurrent_sources: 4,
            source_timeout_ms: 2000,
        }
    }
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            critical_margin: 10.0,
            thresholds: Vec::new(),
        }
    }
}

impl Default for ForecastingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 25000,
            horizon_seconds: 300,
            min_history: 10,
            timeout_ms: 5000,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 120 }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self { timeout_ms: 500 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn resource_sources() -> Vec<SourceSpec> {
    [
        ("cpu", SystemResource::Cpu),
        ("memory", SystemResource::Memory),
        ("disk", SystemResource::Disk),
    ]
    .into_iter()
    .map(|(name, resource)| SourceSpec::System {
        name: name.to_string(),
        resource,
    })
    .collect()
}

fn resource_thresholds(limit: f64) -> Vec<Threshold> {
    ["cpu", "memory", "disk"]
        .into_iter()
        .map(|metric| Threshold::new(metric, Comparator::Gt, limit))
        .collect()
}

impl EngineConfig {
    /// Host resources every 7 s, alert above 85 %, no forecasting
    pub fn development() -> Self {
        Self {
            profile: "development".to_string(),
            scheduling: SchedulingConfig::default(),
            alerting: AlertingConfig {
                thresholds: resource_thresholds(85.0),
                ..AlertingConfig::default()
            },
            forecasting: ForecastingConfig::default(),
            history: HistoryConfig::default(),
            sink: SinkConfig::default(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
            sources: resource_sources(),
        }
    }

    /// Host resources and cloud availability every 25 s, alert above 75 %,
    /// 300 s forecasts each tick
    pub fn experimental() -> Self {
        let mut sources = resource_sources();
        let mut thresholds = resource_thresholds(75.0);
        for provider in CLOUD_PROVIDERS {
            let metric = format!("cloud.{}.availability", provider);
            sources.push(SourceSpec::Availability {
                name: metric.clone(),
                healthy_probability: 0.9,
            });
            thresholds.push(Threshold::new(metric, Comparator::Lt, 1.0));
        }

        Self {
            profile: "experimental".to_string(),
            scheduling: SchedulingConfig {
                interval_ms: 25000,
                ..SchedulingConfig::default()
            },
            alerting: AlertingConfig {
                thresholds,
                ..AlertingConfig::default()
            },
            forecasting: ForecastingConfig {
                enabled: true,
                interval_ms: 25000,
                ..ForecastingConfig::default()
            },
            history: HistoryConfig::default(),
            sink: SinkConfig::default(),
            logging: LoggingConfig::default(),
            sources,
        }
    }

    /// Random resource readings every 2 s, for demos without a real host
    pub fn simulation() -> Self {
        let sources = ["cpu", "memory", "disk"]
            .into_iter()
            .map(|name| SourceSpec::Simulated {
                name: name.to_string(),
                min: 0.0,
                max: 100.0,
                failure_rate: 0.05,
            })
            .collect();

        Self {
            profile: "simulation".to_string(),
            scheduling: SchedulingConfig {
                interval_ms: 2000,
                ..SchedulingConfig::default()
            },
            alerting: AlertingConfig {
                thresholds: resource_thresholds(85.0),
                ..AlertingConfig::default()
            },
            forecasting: ForecastingConfig {
                enabled: true,
                interval_ms: 10000,
                min_history: 5,
                ..ForecastingConfig::default()
            },
            history: HistoryConfig { capacity: 60 },
            sink: SinkConfig::default(),
            logging: LoggingConfig::default(),
            sources,
        }
    }

    /// Look up a built-in profile by name
    pub fn profile(name: &str) -> ConfigResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "development" => Ok(Self::development()),
            "experimental" => Ok(Self::experimental()),
            "simulation" => Ok(Self::simulation()),
            _ => Err(ConfigError::UnknownProfile { name: name.to_string() }),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.to_string_lossy().to_string() })?;

        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError { reason: e.to_string() })?;

        config.validate()?;
        Ok(config)
    }

    /// Select the profile named by `MONITOR_ENV` and apply environment overrides
    pub fn from_env() -> ConfigResult<Self> {
        let name = std::env::var(PROFILE_ENV).unwrap_or_else(|_| DEFAULT_PROFILE.to_string());
        let config = Self::profile(&name)?.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MONITOR_INTERVAL_MS` and `MONITOR_FORECASTING` when set
    pub fn with_env_overrides(mut self) -> ConfigResult<Self> {
        if let Ok(interval) = std::env::var(INTERVAL_ENV) {
            self.scheduling.interval_ms = interval.parse().map_err(|_| ConfigError::InvalidValue {
                field: INTERVAL_ENV.to_string(),
                value: interval,
            })?;
        }

        if let Ok(forecasting) = std::env::var(FORECASTING_ENV) {
            self.forecasting.enabled = forecasting.parse().map_err(|_| ConfigError::InvalidValue {
                field: FORECASTING_ENV.to_string(),
                value: forecasting,
            })?;
        }

        Ok(self)
    }

    /// Load configuration with fallback order: file -> profile from env -> defaults,
    /// with environment overrides applied last
    pub fn load_with_fallback<P: AsRef<Path>>(config_path: Option<P>) -> ConfigResult<Self> {
        let config = match config_path {
            Some(path) if path.as_ref().exists() => Self::from_file(path)?,
            Some(path) => {
                return Err(ConfigError::FileNotFound {
                    path: path.as_ref().to_string_lossy().to_string(),
                })
            }
            None => {
                let default_path = Self::default_config_path()?;
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    let name = std::env::var(PROFILE_ENV).unwrap_or_else(|_| DEFAULT_PROFILE.to_string());
                    Self::profile(&name)?
                }
            }
        };

        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration on its own. Source coverage of thresholds
    /// is checked here when sources are declared, and again by the engine
    /// against the sources actually registered.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheduling.interval_ms == 0 {
            return Err(invalid("scheduling.interval_ms", 0));
        }

        if self.scheduling.max_concurrent_sources == 0 {
            return Err(invalid("scheduling.max_concurrent_sources", 0));
        }

        if self.scheduling.source_timeout_ms == 0 {
            return Err(invalid("scheduling.source_timeout_ms", 0));
        }

        if !self.alerting.critical_margin.is_finite() || self.alerting.critical_margin < 0.0 {
            return Err(invalid("alerting.critical_margin", self.alerting.critical_margin));
        }

        for threshold in &self.alerting.thresholds {
            if threshold.metric.trim().is_empty() {
                return Err(invalid("alerting.thresholds.metric", "\"\""));
            }
            if !threshold.limit.is_finite() {
                return Err(invalid(&format!("alerting.thresholds.{}.limit", threshold.metric), threshold.limit));
            }
        }

        if self.forecasting.enabled {
            if self.forecasting.interval_ms == 0 {
                return Err(invalid("forecasting.interval_ms", 0));
            }
            if self.forecasting.horizon_seconds == 0 {
                return Err(invalid("forecasting.horizon_seconds", 0));
            }
            if self.forecasting.min_history == 0 {
                return Err(invalid("forecasting.min_history", 0));
            }
            if self.forecasting.timeout_ms == 0 {
                return Err(invalid("forecasting.timeout_ms", 0));
            }
            if self.history.capacity < self.forecasting.min_history {
                return Err(ConfigError::ValidationFailed {
                    reason: format!(
                        "history.capacity ({}) is smaller than forecasting.min_history ({})",
                        self.history.capacity, self.forecasting.min_history
                    ),
                });
            }
        }

        if self.history.capacity == 0 {
            return Err(invalid("history.capacity", 0));
        }

        if self.sink.timeout_ms == 0 {
            return Err(invalid("sink.timeout_ms", 0));
        }

        if !self.sources.is_empty() {
            let mut names = HashSet::new();
            for spec in &self.sources {
                if !names.insert(spec.name()) {
                    return Err(ConfigError::DuplicateSource { name: spec.name().to_string() });
                }
                if let Err((field, value)) = spec.check() {
                    return Err(invalid(&format!("sources.{}.{}", spec.name(), field), value));
                }
            }
            validate_threshold_coverage(&self.alerting.thresholds, names)?;
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.scheduling.interval_ms)
    }

    pub fn forecast_interval(&self) -> Duration {
        Duration::from_millis(self.forecasting.interval_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduling.source_timeout_ms)
    }

    pub fn forecast_timeout(&self) -> Duration {
        Duration::from_millis(self.forecasting.timeout_ms)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink.timeout_ms)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("aurora").join("monitor.toml"))
            .ok_or_else(|| ConfigError::ValidationFailed {
                reason: "Unable to determine config directory".to_string(),
            })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| ConfigError::ValidationFailed {
                reason: format!("Unable to create config directory: {}", parent.display()),
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationFailed { reason: e.to_string() })?;

        fs::write(path, content)
            .map_err(|_| ConfigError::PermissionDenied { path: path.to_string_lossy().to_string() })?;

        Ok(())
    }
}

/// Every threshold must name a metric that one of `metrics` produces
pub fn validate_threshold_coverage<'a, I>(thresholds: &[Threshold], metrics: I) -> ConfigResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let known: HashSet<&str> = metrics.into_iter().collect();
    match thresholds.iter().find(|t| !known.contains(t.metric.as_str())) {
        Some(threshold) => Err(ConfigError::UnknownMetric { metric: threshold.metric.clone() }),
        None => Ok(()),
    }
}

fn invalid(field: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}
