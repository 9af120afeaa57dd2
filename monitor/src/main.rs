//! Lottery site metrics monitor entry point
//!
//! Hosts a single [`MetricsMonitor`] for the life of the process and exposes
//! one-shot commands for sampling, health checks and export.

use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use lottery_monitor::{alerts, health_score, HealthStatus, MetricsMonitor, MonitorConfig};

/// Lottery site metrics monitor command line interface
#[derive(Parser)]
#[command(name = "lottery-monitor")]
#[command(about = "Polling health and metrics monitor for the lottery prediction site")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (overrides the configuration file)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the monitor until interrupted
    Run {
        /// Sampling interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Write the retained history to this file on shutdown
        #[arg(long)]
        export_on_exit: Option<PathBuf>,

        /// Restore history from a previous export before sampling
        #[arg(long)]
        restore_from: Option<PathBuf>,
    },

    /// Collect one sample and print it
    Sample,

    /// Collect one sample and report health and alerts
    Health,

    /// Collect samples and export them
    Export {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of samples to collect before exporting
        #[arg(long, default_value_t = 1)]
        ticks: usize,

        /// Output format (json, prometheus)
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Write the effective configuration to this path
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let started = Instant::now();
    let cli = Cli::parse();

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            process::exit(1);
        }
    };

    let _log_guard = match initialize_logging(&cli, &config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Run { interval_ms, export_on_exit, restore_from }) => {
            run_monitor(config, started, interval_ms, export_on_exit, restore_from).await
        }
        Some(Commands::Sample) => print_sample(config, started).await,
        Some(Commands::Health) => health_check(config, started).await,
        Some(Commands::Export { output, ticks, format }) => {
            export_metrics(config, started, output, ticks, &format).await
        }
        Some(Commands::Config { show, write }) => handle_config(&config, show, write),
        None => run_monitor(config, started, None, None, None).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        process::exit(1);
    }
}

/// Initialize logging based on configuration
fn initialize_logging(cli: &Cli, config: &MonitorConfig) -> Result<Option<WorkerGuard>> {
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone())
        .to_lowercase();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("lottery_monitor={},tokio=warn", level))
            .with_context(|| format!("invalid log level: {}", level))?,
    };

    let json = cli.json_logs || config.logging.format == "json";
    let console_layer = match (config.logging.console, json) {
        (false, _) => None,
        (true, true) => Some(fmt::layer().json().boxed()),
        (true, false) => Some(fmt::layer().with_target(false).boxed()),
    };

    let (file_layer, guard) = match &config.logging.file_path {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .context("log file path has no file name")?;
            std::fs::create_dir_all(directory)
                .with_context(|| format!("cannot create log directory {}", directory.display()))?;

            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Load configuration from file, environment and defaults
fn load_configuration(cli: &Cli) -> Result<MonitorConfig> {
    let config = match &cli.config {
        Some(path) => MonitorConfig::from_file(path)?.apply_env()?,
        None => {
            let default_path = MonitorConfig::default_config_path()?;
            MonitorConfig::load_with_fallback(Some(default_path))?
        }
    };

    config.validate()?;
    Ok(config)
}

/// Build the process-wide monitor, recording how long startup took
fn build_monitor(config: MonitorConfig, started: Instant) -> Result<MetricsMonitor> {
    let monitor = MetricsMonitor::new(config).context("failed to build metrics monitor")?;
    monitor.performance_hints().record_load_time(started.elapsed());
    Ok(monitor)
}

/// Run the monitor until SIGINT or SIGTERM
async fn run_monitor(
    config: MonitorConfig,
    started: Instant,
    interval_ms: Option<u64>,
    export_on_exit: Option<PathBuf>,
    restore_from: Option<PathBuf>,
) -> Result<()> {
    if interval_ms == Some(0) {
        bail!("interval must be greater than zero");
    }

    let monitor = build_monitor(config, started)?;

    if let Some(path) = restore_from {
        let exported = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        monitor.import_metrics(&exported)?;
        monitor.cleanup();
    }

    let interval = match interval_ms {
        Some(ms) => {
            let interval = Duration::from_millis(ms);
            monitor.start_monitoring(interval);
            interval
        }
        None => {
            monitor.start();
            Duration::from_millis(monitor.config().monitoring.interval_ms)
        }
    };
    let cleanup_every = monitor.config().monitoring.cleanup_every_ticks;
    info!("Lottery monitor running");

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    if cleanup_every > 0 {
        let every = u32::try_from(cleanup_every).unwrap_or(u32::MAX);
        let mut cleanup = tokio::time::interval(interval.saturating_mul(every));
        cleanup.tick().await;
        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result?;
                    break;
                }
                _ = cleanup.tick() => {
                    let dropped = monitor.cleanup();
                    if dropped > 0 {
                        info!("Retention cleanup dropped {} samples", dropped);
                    }
                }
            }
        }
    } else {
        shutdown.await?;
    }

    info!("Initiating graceful shutdown");
    if let Err(e) = monitor.shutdown().await {
        warn!("{}", e);
    }

    let stats = monitor.stats();
    info!(
        ticks = stats.ticks_completed,
        failed = stats.ticks_failed,
        alerts = stats.alerts_fired,
        "Lottery monitor stopped"
    );

    if let Some(path) = export_on_exit {
        write_output(Some(&path), &monitor.export_metrics())?;
    }

    Ok(())
}

/// Collect one sample and print it as JSON
async fn print_sample(config: MonitorConfig, started: Instant) -> Result<()> {
    let monitor = build_monitor(config, started)?;
    let sample = monitor.collect_now().await?;
    println!("{}", serde_json::to_string_pretty(&sample)?);
    Ok(())
}

/// Collect one sample and report its health
async fn health_check(config: MonitorConfig, started: Instant) -> Result<()> {
    let thresholds = config.thresholds.clone();
    let monitor = build_monitor(config, started)?;
    let sample = monitor.collect_now().await?;

    let score = health_score(&sample);
    let status = HealthStatus::from_score(score);

    println!("Lottery Monitor Health Check");
    println!("============================");
    println!("Score: {:.1} ({:?})", score, status);
    println!(
        "Memory: {:.1}MB, load time: {:.0}ms",
        sample.performance.memory_usage_bytes as f64 / 1024.0 / 1024.0,
        sample.performance.load_time_ms
    );

    for (dependency, health) in &sample.dependencies {
        println!(
            "  {:<14} {:?} ({:.0}ms)",
            dependency.name(),
            health.status,
            health.response_time_ms
        );
    }

    let fired = alerts::evaluate(&sample, &thresholds);
    if fired.is_empty() {
        println!("No alerts");
    } else {
        println!("Alerts:");
        for alert in &fired {
            println!("  - [{}] {}", alert.kind, alert.message);
        }
    }

    if status == HealthStatus::Critical {
        warn!("Health is critical");
    }
    Ok(())
}

/// Collect `ticks` samples and export the history
async fn export_metrics(
    config: MonitorConfig,
    started: Instant,
    output: Option<PathBuf>,
    ticks: usize,
    format: &str,
) -> Result<()> {
    let monitor = build_monitor(config, started)?;
    for _ in 0..ticks {
        if let Err(e) = monitor.collect_now().await {
            warn!("Skipping failed sample: {}", e);
        }
    }

    let exported = match format {
        "json" => monitor.export_metrics(),
        #[cfg(feature = "metrics")]
        "prometheus" => monitor.export_prometheus()?,
        other => bail!("Unsupported format: {}", other),
    };

    write_output(output.as_deref(), &exported)
}

/// Validate, show or write the effective configuration
fn handle_config(config: &MonitorConfig, show: bool, write: Option<PathBuf>) -> Result<()> {
    config.validate()?;

    if show {
        println!("Effective configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    } else {
        println!("Configuration is valid");
    }

    if let Some(path) = write {
        config.save_to_file(&path)?;
        println!("Configuration written to: {}", path.display());
    }

    Ok(())
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!("Metrics exported to: {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

/// Handle shutdown signals
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            result = signal::ctrl_c() => {
                result?;
                info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl-C, initiating graceful shutdown");
    }

    Ok(())
}
