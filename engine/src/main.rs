//! Aurora monitor entry point
//!
//! Samples the configured sources on a fixed interval until SIGINT or
//! SIGTERM, reporting through the tracing subscriber.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use aurora_engine::config::PROFILE_ENV;
use aurora_engine::{ConfigError, Engine, EngineConfig, MonitorError, SourceSpec, TracingSink};

/// Aurora monitor command line interface
#[derive(Parser)]
#[command(name = "aurora-monitor")]
#[command(about = "Periodic health monitoring with threshold alerts and forecasting")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Built-in profile, overriding MONITOR_ENV
    #[arg(short, long)]
    profile: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring loop until interrupted
    Run,

    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },

    /// Validate configuration and run a single tick
    Check {
        /// Print engine counters after the tick
        #[arg(long)]
        metrics: bool,
    },

    /// List configured metric sources
    Sources,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(&cli) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => fail(&MonitorError::from(e)),
    };

    let result = match &cli.command {
        Some(Commands::Run) | None => run_engine(config).await,
        Some(Commands::Config { show }) => handle_config(&config, *show),
        Some(Commands::Check { metrics }) => check(config, *metrics).await,
        Some(Commands::Sources) => list_sources(&config),
    };

    if let Err(e) = result {
        match e.downcast_ref::<MonitorError>() {
            Some(monitor_error) => fail(monitor_error),
            None => {
                error!("Command failed: {:#}", e);
                process::exit(1);
            }
        }
    }
}

/// Log a structured error and exit with a non-zero status
fn fail(error: &MonitorError) -> ! {
    error!(
        category = error.category(),
        critical = error.is_critical(),
        error = %error,
        "Aurora monitor failed"
    );
    process::exit(1);
}

/// Initialize logging based on command line flags
fn initialize_logging(cli: &Cli) -> anyhow::Result<()> {
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("aurora_engine={}", log_level).parse()?)
        .add_directive(format!("aurora_monitor={}", log_level).parse()?)
        .add_directive("tokio=warn".parse()?)
        .add_directive("mio=warn".parse()?);

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();
    }

    Ok(())
}

/// Load configuration: explicit file, then explicit profile, then
/// the default file location or the MONITOR_ENV profile
fn load_configuration(cli: &Cli) -> Result<EngineConfig, ConfigError> {
    let config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path.display());
        EngineConfig::load_with_fallback(Some(config_path))?
    } else if let Some(profile) = &cli.profile {
        info!("Using profile: {}", profile);
        let config = EngineConfig::profile(profile)?.with_env_overrides()?;
        config.validate()?;
        config
    } else {
        if let Ok(profile) = std::env::var(PROFILE_ENV) {
            info!("Using profile from {}: {}", PROFILE_ENV, profile);
        }
        EngineConfig::load_with_fallback(None::<PathBuf>)?
    };

    info!("Configuration loaded successfully");
    Ok(config)
}

fn banner(config: &EngineConfig) {
    let forecasting = if config.forecasting.enabled { "enabled" } else { "disabled" };
    info!(
        profile = %config.profile,
        forecasting,
        interval_ms = config.scheduling.interval_ms,
        sources = config.sources.len(),
        thresholds = config.alerting.thresholds.len(),
        "Aurora monitor starting in {} mode (forecasting {}, every {} ms)",
        config.profile,
        forecasting,
        config.scheduling.interval_ms
    );
}

/// Run the engine until a shutdown signal arrives
async fn run_engine(config: EngineConfig) -> anyhow::Result<()> {
    banner(&config);

    let mut engine = Engine::from_config(config, Arc::new(TracingSink))?;
    engine.start().await?;

    engine.wait_for_shutdown().await?;

    info!("Initiating graceful shutdown");
    engine.stop().await?;

    let state = engine.get_status().await;
    info!(
        ticks = state.stats.ticks_completed,
        skipped = state.stats.ticks_skipped,
        alerts = state.stats.realtime_alerts + state.stats.predictive_alerts,
        "Aurora monitor stopped"
    );
    Ok(())
}

/// Handle configuration commands
fn handle_config(config: &EngineConfig, show: bool) -> anyhow::Result<()> {
    if show {
        println!("Effective configuration:");
        println!("{}", toml::to_string_pretty(config).context("rendering configuration")?);
    } else {
        println!("Configuration is valid (profile: {})", config.profile);
    }
    Ok(())
}

/// Validate the configuration end to end and print one health report
async fn check(config: EngineConfig, show_metrics: bool) -> anyhow::Result<()> {
    banner(&config);

    let engine = Engine::from_config(config, Arc::new(TracingSink))?;
    let report = engine.run_once().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if show_metrics {
        println!("{}", engine.metrics_text()?);
    }
    Ok(())
}

/// List configured metric sources
fn list_sources(config: &EngineConfig) -> anyhow::Result<()> {
    for spec in &config.sources {
        let description = match spec {
            SourceSpec::System { resource, .. } => format!("system ({:?})", resource),
            SourceSpec::Simulated { min, max, failure_rate, .. } => {
                format!("simulated [{}, {}) failure rate {}", min, max, failure_rate)
            }
            SourceSpec::Availability { healthy_probability, .. } => {
                format!("availability (healthy probability {})", healthy_probability)
            }
        };
        println!("{:<32} {}", spec.name(), description);
    }
    Ok(())
}
