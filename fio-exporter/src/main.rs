//! fio exporter
//!
//! Runs a fio benchmark on a schedule and serves the parsed terse results as
//! Prometheus gauges on `/metrics`.

#![forbid(unsafe_code)]

mod http_api;
mod metrics;
mod runner;
mod scheduler;

use anyhow::{Context, Result, bail};
use clap::Parser;
use fio_exporter_common::{
    BenchmarkKind, ConfigLayer, ExporterConfig, LogConfig, init_logging,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use http_api::HttpState;
use metrics::FIO_GAUGES;
use runner::RunInvocation;
use scheduler::{ScheduleMode, Scheduler};

#[derive(Parser)]
#[command(name = "fio-exporter")]
#[command(author, version, about = "Prometheus exporter for fio benchmarks")]
struct Cli {
    /// Path to a TOML config file; flags override its values
    #[arg(short, long, env = "FIO_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Benchmark profile: iops, latency, throughput or custom
    #[arg(long, value_parser = parse_benchmark)]
    benchmark: Option<BenchmarkKind>,

    /// fio flags for the custom profile (experts only)
    #[arg(long, alias = "customFioBenchmarkFlags", allow_hyphen_values = true)]
    custom_fio_flags: Option<String>,

    /// Directory for benchmark files
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Size of the file used for the benchmark, e.g. 1G
    #[arg(long, alias = "fileSize")]
    file_size: Option<String>,

    /// Runtime of each benchmark in seconds
    #[arg(long, alias = "benchmarkRuntime")]
    runtime: Option<u64>,

    /// TCP listen port for /metrics
    #[arg(long, env = "FIO_EXPORTER_PORT")]
    port: Option<u16>,

    /// Interval between consecutive benchmark runs, e.g. 6h or 0s
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Exit after one benchmark once the run-once wait has expired
    #[arg(long, alias = "runOnce")]
    run_once: bool,

    /// How long to keep serving metrics after a run-once benchmark
    #[arg(long, alias = "runOnceWait", value_parser = humantime::parse_duration)]
    run_once_wait: Option<Duration>,

    /// Publish intermediate results while a benchmark is running
    #[arg(long, alias = "statusUpdates")]
    status_updates: bool,

    /// Seconds between intermediate results when status updates are enabled
    #[arg(long, alias = "statusUpdateInterval")]
    status_update_interval: Option<u64>,

    /// fio executable to run
    #[arg(long, env = "FIO_EXPORTER_FIO_BINARY")]
    fio_binary: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Flags as a config layer. Unset switches stay unset so the config
    /// file can turn them on.
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            benchmark: self.benchmark,
            custom_fio_flags: self.custom_fio_flags.clone(),
            directory: self.directory.clone(),
            file_size: self.file_size.clone(),
            runtime_secs: self.runtime,
            port: self.port,
            interval: self.interval,
            run_once: self.run_once.then_some(true),
            run_once_wait: self.run_once_wait,
            status_updates: self.status_updates.then_some(true),
            status_update_interval_secs: self.status_update_interval,
            fio_binary: self.fio_binary.clone(),
        }
    }
}

fn parse_benchmark(value: &str) -> Result<BenchmarkKind, String> {
    BenchmarkKind::parse(value)
        .ok_or_else(|| format!("unknown benchmark '{value}' (iops, latency, throughput or custom)"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info");
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    if let Err(e) = serve(&cli).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

/// Everything after logging is up. Returns only on run-once completion or a
/// fatal error.
async fn serve(cli: &Cli) -> Result<()> {
    let config = ExporterConfig::resolve(cli.layer(), cli.config.as_deref())
        .context("failed to load configuration")?;
    let profile = config
        .profile()
        .context("invalid benchmark configuration")?;

    if let Err(e) = metrics::register_metrics() {
        warn!("Failed to register some metrics: {}", e);
    }
    metrics::set_exporter_info(env!("CARGO_PKG_VERSION"));

    let server = http_api::start_server(
        config.port,
        HttpState {
            registry: metrics::REGISTRY.clone(),
            gauges: FIO_GAUGES.clone(),
            benchmark: profile.label(),
            version: env!("CARGO_PKG_VERSION"),
            started_at: Instant::now(),
            pid: std::process::id(),
        },
    )
    .await
    .with_context(|| format!("failed to listen on port {}", config.port))?;

    let mode = if config.run_once {
        ScheduleMode::RunOnce {
            wait: config.run_once_wait,
        }
    } else {
        ScheduleMode::Repeat {
            interval: config.interval,
        }
    };
    let scheduler = Scheduler::new(
        RunInvocation::for_profile(&config.fio_binary, &profile),
        profile.label(),
        mode,
        Arc::new(FIO_GAUGES.clone()),
    );
    info!(benchmark = profile.label(), "Starting benchmark scheduler");

    tokio::select! {
        result = scheduler.run() => {
            result.context("fio benchmark failed")?;
            info!("Run-once benchmark complete, exiting");
        }
        result = server => {
            match result {
                Ok(Ok(())) => bail!("HTTP server stopped unexpectedly"),
                Ok(Err(e)) => return Err(e).context("HTTP server failed"),
                Err(e) => return Err(e).context("HTTP server task failed"),
            }
        }
    }

    Ok(())
}
