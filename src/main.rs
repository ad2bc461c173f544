use agecalc::run::DEFAULT_PROGRESS_INTERVAL;
use agecalc::{RunConfig, run};
use clap::{Parser, ValueEnum};
use spdlog::prelude::*;
use spdlog::{Level, LevelFilter};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::Error,
            LogLevel::Warn => Level::Warn,
            LogLevel::Info => Level::Info,
            LogLevel::Debug => Level::Debug,
            LogLevel::Trace => Level::Trace,
        }
    }
}

/// Computes per-node age and FIB occupancy integrals from simulation traces.
#[derive(Parser)]
#[command(name = "agecalc", version)]
struct Args {
    /// Delivery trace written by the sender side.
    sender_trace: PathBuf,
    /// Per-node report.
    output: PathBuf,
    /// Allocation trace, enables FIB occupancy tracking.
    alloc_trace: Option<PathBuf>,
    /// Global occupancy time series.
    occupancy_series: Option<PathBuf>,
    /// Directory for per-node occupancy series.
    per_node_dir: Option<PathBuf>,
    /// Lines between progress reports, 0 disables them.
    #[arg(long, default_value_t = DEFAULT_PROGRESS_INTERVAL)]
    progress_interval: u64,
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

impl From<Args> for RunConfig {
    fn from(args: Args) -> Self {
        RunConfig {
            sender_trace: args.sender_trace,
            output: args.output,
            alloc_trace: args.alloc_trace,
            occupancy_series: args.occupancy_series,
            per_node_dir: args.per_node_dir,
            progress_interval: args.progress_interval,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    spdlog::default_logger().set_level_filter(LevelFilter::MoreSevereEqual(args.log_level.into()));

    info!("[System] Booting agecalc...");
    let config = RunConfig::from(args);
    match run(&config) {
        Ok(summary) => {
            info!(
                "[System] nodes {} deliveryLines {} skipped {}",
                summary.nodes, summary.delivery.lines, summary.delivery.skipped
            );
            if let Some(fib) = &summary.fib {
                info!("[System] {}", fib);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("[System] {}", e);
            ExitCode::FAILURE
        }
    }
}
