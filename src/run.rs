use crate::clock::{FinishedClock, GlobalClock};
use crate::collector::{OccupancyPoint, OutputCollector, SeriesWriter};
use crate::control::{ControlLifecycleTable, ControlSummary};
use crate::delivery::{DeliveryPass, PassStats};
use crate::error::CalcError;
use crate::fib::{FibOccupancyEngine, FibTotals};
use crate::node::NodeRegistry;
use crate::report::ReportAssembler;
use spdlog::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1_000_000;

/// Inputs and outputs of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub sender_trace: PathBuf,
    pub output: PathBuf,
    /// Enables FIB occupancy tracking.
    pub alloc_trace: Option<PathBuf>,
    pub occupancy_series: Option<PathBuf>,
    pub per_node_dir: Option<PathBuf>,
    /// Lines between progress reports, 0 disables them.
    pub progress_interval: u64,
}

impl RunConfig {
    pub fn new(sender_trace: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            sender_trace: sender_trace.into(),
            output: output.into(),
            alloc_trace: None,
            occupancy_series: None,
            per_node_dir: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub clock: FinishedClock,
    pub nodes: usize,
    pub delivery: PassStats,
    pub allocation: Option<PassStats>,
    pub fib: Option<FibTotals>,
    pub controls: Option<ControlSummary>,
}

/// Runs both passes and writes the report.
pub fn run(config: &RunConfig) -> Result<RunSummary, CalcError> {
    let output = File::create(&config.output).map_err(CalcError::io(&config.output))?;

    let mut clock = GlobalClock::new();
    let mut nodes = NodeRegistry::default();
    let mut controls = ControlLifecycleTable::new();

    let sender = File::open(&config.sender_trace).map_err(CalcError::io(&config.sender_trace))?;
    let delivery = DeliveryPass::new(&mut clock, &mut nodes, &mut controls).consume(
        BufReader::new(sender),
        &config.sender_trace,
        config.progress_interval,
    )?;
    let clock = clock.finish()?;

    let mut summary = RunSummary {
        clock,
        nodes: nodes.len(),
        delivery,
        allocation: None,
        fib: None,
        controls: None,
    };

    let mut per_node_dir = None;
    if let Some(alloc_trace) = &config.alloc_trace {
        per_node_dir = config.per_node_dir.clone().filter(|dir| match std::fs::create_dir_all(dir) {
            Ok(()) => true,
            Err(e) => {
                error!("[System] cannot create per-node directory {:?}: {}", dir, e);
                false
            }
        });

        let (stats, totals) = replay_allocations(
            config,
            alloc_trace,
            &summary.clock,
            &mut nodes,
            &mut controls,
            per_node_dir.is_some(),
        )?;
        summary.allocation = Some(stats);
        summary.fib = Some(totals);

        let control_summary = controls.summarize(summary.clock.forwarder.end)?;
        info!("[System] {}", control_summary);
        info!("[System] FIB entry lifetimes {}", control_summary.lifetimes);
        summary.controls = Some(control_summary);
    }

    ReportAssembler::new(&summary.clock, config.alloc_trace.is_some())
        .with_per_node_dir(per_node_dir)
        .write(BufWriter::new(output), &config.output, &mut nodes)?;

    info!("[System] Done!");
    Ok(summary)
}

fn replay_allocations(
    config: &RunConfig,
    alloc_trace: &Path,
    clock: &FinishedClock,
    nodes: &mut NodeRegistry,
    controls: &mut ControlLifecycleTable,
    per_node_series: bool,
) -> Result<(PassStats, FibTotals), CalcError> {
    let mut writer = config
        .occupancy_series
        .as_ref()
        .map(SeriesWriter::create)
        .transpose()?;
    let mut series = |point: OccupancyPoint| {
        if let Some(writer) = writer.as_mut() {
            writer.push(point);
        }
    };

    let alloc = File::open(alloc_trace).map_err(CalcError::io(alloc_trace))?;
    let mut engine = FibOccupancyEngine::new(nodes, controls, clock.forwarder, per_node_series);
    engine.open(&mut series);
    let stats = engine.consume(
        BufReader::new(alloc),
        alloc_trace,
        config.progress_interval,
        &mut series,
    )?;
    let totals = engine.finish(&mut series);

    if let Some(writer) = writer {
        writer.finish()?;
    }
    Ok((stats, totals))
}
