//! Metric sources
//!
//! A [`MetricSource`] produces one [`Sample`] per call. The engine never
//! reads the host itself; it only talks to sources through this trait.
//! Host sampling through `sysinfo` and simulated sources are provided here
//! as ready-made collaborators.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};
use tokio_util::sync::CancellationToken;

use crate::error::{SourceError, SourceResult};
use crate::types::Sample;

/// Capability producing named numeric samples on demand
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Registration name, unique within an engine
    fn name(&self) -> &str;

    /// Metric name carried by the samples this source produces
    fn metric(&self) -> &str {
        self.name()
    }

    /// Take one reading. Implementations should return promptly with
    /// [`SourceError::Cancelled`] once `cancel` fires.
    async fn sample(&self, cancel: &CancellationToken) -> SourceResult<Sample>;
}

/// Host resources readable through `sysinfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemResource {
    /// Global CPU usage in percent
    Cpu,
    /// Used memory in percent of total
    Memory,
    /// Used disk space in percent across all mounted disks
    Disk,
    /// One minute load average
    Load,
}

/// Reads host metrics. The `System` handle is kept between calls so CPU
/// usage is measured over the interval since the previous sample.
pub struct SystemSource {
    name: String,
    resource: SystemResource,
    system: Arc<Mutex<System>>,
}

impl SystemSource {
    pub fn new(name: impl Into<String>, resource: SystemResource) -> Self {
        Self {
            name: name.into(),
            resource,
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    fn read(resource: SystemResource, system: &Mutex<System>) -> Result<f64, String> {
        match resource {
            SystemResource::Cpu => {
                let mut system = system.lock().map_err(|_| "system handle poisoned".to_string())?;
                system.refresh_cpu();
                Ok(system.global_cpu_info().cpu_usage() as f64)
            }
            SystemResource::Memory => {
                let mut system = system.lock().map_err(|_| "system handle poisoned".to_string())?;
                system.refresh_memory();
                let total = system.total_memory();
                if total == 0 {
                    return Err("total memory reported as zero".to_string());
                }
                Ok(system.used_memory() as f64 / total as f64 * 100.0)
            }
            SystemResource::Disk => {
                let disks = Disks::new_with_refreshed_list();
                let (total, available) = disks
                    .iter()
                    .fold((0u64, 0u64), |(t, a), d| (t + d.total_space(), a + d.available_space()));
                if total == 0 {
                    return Err("no mounted disks".to_string());
                }
                Ok((total - available) as f64 / total as f64 * 100.0)
            }
            SystemResource::Load => Ok(System::load_average().one),
        }
    }
}

#[async_trait]
impl MetricSource for SystemSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sample(&self, cancel: &CancellationToken) -> SourceResult<Sample> {
        let system = self.system.clone();
        let resource = self.resource;
        let read = tokio::task::spawn_blocking(move || Self::read(resource, &system));

        let value = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(SourceError::Cancelled { source_name: self.name.clone() });
            }
            joined = read => joined.map_err(|e| SourceError::Unavailable {
                source_name: self.name.clone(),
                reason: e.to_string(),
            })?,
        };

        value
            .map(|v| Sample::new(self.name.clone(), v))
            .map_err(|reason| SourceError::Unavailable {
                source_name: self.name.clone(),
                reason,
            })
    }
}

/// Produces uniformly distributed values, for demos and load tests
pub struct SimulatedSource {
    name: String,
    min: f64,
    max: f64,
    failure_rate: f64,
}

impl SimulatedSource {
    /// Values drawn from `[min, max)`. An empty or unbounded range makes
    /// every reading fail.
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            failure_rate: 0.0,
        }
    }

    /// Fail this fraction of readings with `SourceUnavailable`
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = if failure_rate.is_nan() { 0.0 } else { failure_rate.clamp(0.0, 1.0) };
        self
    }
}

#[async_trait]
impl MetricSource for SimulatedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sample(&self, cancel: &CancellationToken) -> SourceResult<Sample> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled { source_name: self.name.clone() });
        }
        if !is_range(self.min, self.max) {
            return Err(SourceError::Unavailable {
                source_name: self.name.clone(),
                reason: format!("empty value range [{}, {})", self.min, self.max),
            });
        }

        let mut rng = rand::thread_rng();
        if self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate) {
            return Err(SourceError::Unavailable {
                source_name: self.name.clone(),
                reason: "simulated outage".to_string(),
            });
        }

        Ok(Sample::new(self.name.clone(), rng.gen_range(self.min..self.max)))
    }
}

/// Reports provider availability as 1.0 (healthy) or 0.0 (degraded)
pub struct AvailabilitySource {
    name: String,
    healthy_probability: f64,
}

impl AvailabilitySource {
    pub fn new(name: impl Into<String>, healthy_probability: f64) -> Self {
        Self {
            name: name.into(),
            healthy_probability: if healthy_probability.is_nan() {
                0.0
            } else {
                healthy_probability.clamp(0.0, 1.0)
            },
        }
    }
}

#[async_trait]
impl MetricSource for AvailabilitySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sample(&self, cancel: &CancellationToken) -> SourceResult<Sample> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled { source_name: self.name.clone() });
        }

        let healthy = rand::thread_rng().gen_bool(self.healthy_probability);
        Ok(Sample::new(self.name.clone(), if healthy { 1.0 } else { 0.0 }))
    }
}

/// Declarative description of a source, as found in configuration files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    System {
        name: String,
        resource: SystemResource,
    },
    Simulated {
        name: String,
        min: f64,
        max: f64,
        #[serde(default)]
        failure_rate: f64,
    },
    Availability {
        name: String,
        healthy_probability: f64,
    },
}

impl SourceSpec {
    pub fn name(&self) -> &str {
        match self {
            SourceSpec::System { name, .. }
            | SourceSpec::Simulated { name, .. }
            | SourceSpec::Availability { name, .. } => name,
        }
    }

    /// Check the parameters the random sources rely on. Returns the
    /// offending field and value.
    pub fn check(&self) -> Result<(), (&'static str, String)> {
        match self {
            SourceSpec::System { .. } => Ok(()),
            SourceSpec::Simulated { min, max, failure_rate, .. } => {
                if !is_range(*min, *max) {
                    return Err(("min..max", format!("{}..{}", min, max)));
                }
                if !is_probability(*failure_rate) {
                    return Err(("failure_rate", failure_rate.to_string()));
                }
                Ok(())
            }
            SourceSpec::Availability { healthy_probability, .. } => {
                if is_probability(*healthy_probability) {
                    Ok(())
                } else {
                    Err(("healthy_probability", healthy_probability.to_string()))
                }
            }
        }
    }

    /// Range the produced values can take, used to clamp forecasts
    pub fn value_range(&self) -> Option<(f64, f64)> {
        match self {
            SourceSpec::System { resource: SystemResource::Load, .. } => Some((0.0, f64::INFINITY)),
            SourceSpec::System { .. } => Some((0.0, 100.0)),
            SourceSpec::Simulated { min, max, .. } => is_range(*min, *max).then_some((*min, *max)),
            SourceSpec::Availability { .. } => Some((0.0, 1.0)),
        }
    }

    pub fn build(&self) -> Arc<dyn MetricSource> {
        match self {
            SourceSpec::System { name, resource } => Arc::new(SystemSource::new(name.clone(), *resource)),
            SourceSpec::Simulated { name, min, max, failure_rate } => {
                Arc::new(SimulatedSource::new(name.clone(), *min, *max).with_failure_rate(*failure_rate))
            }
            SourceSpec::Availability { name, healthy_probability } => {
                Arc::new(AvailabilitySource::new(name.clone(), *healthy_probability))
            }
        }
    }
}

fn is_range(min: f64, max: f64) -> bool {
    min.is_finite() && max.is_finite() && min < max
}

fn is_probability(p: f64) -> bool {
    (0.0..=1.0).contains(&p)
}

/// Instantiate every configured source
pub fn build_sources(specs: &[SourceSpec]) -> Vec<Arc<dyn MetricSource>> {
    specs.iter().map(SourceSpec::build).collect()
}
