use crate::clock::FinishedClock;
use crate::collector::write_series;
use crate::error::{ArithmeticError, CalcError};
use crate::node::{NodeRegistry, NodeRow};
use spdlog::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const HEADER: &str = "nodeId correctReceived dropped misAddressed \
firstT3R firstT8R lastT3R lastT8R nodeDuration totalAge avgAge totalAgeNew avgAgeNew \
firstT1R firstT8'R lastT1R lastT8'R nodeCtrlDuration totalCtrlAge avgCtrlAge totalCtrlAgeNew avgCtrlAgeNew";

pub const FIB_HEADER: &str = "maxFIBSize totalFIBSize*time avgFIBSize";

/// Finalizes every node and writes the per-node table.
pub struct ReportAssembler<'a> {
    clock: &'a FinishedClock,
    with_fib: bool,
    per_node_dir: Option<PathBuf>,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(clock: &'a FinishedClock, with_fib: bool) -> Self {
        Self {
            clock,
            with_fib,
            per_node_dir: None,
        }
    }

    /// Also write each node's occupancy series to `<dir>/<nodeId>.txt`.
    pub fn with_per_node_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.per_node_dir = dir;
        self
    }

    pub fn header(&self) -> String {
        if self.with_fib {
            format!("{HEADER} {FIB_HEADER}")
        } else {
            HEADER.to_string()
        }
    }

    /// Rows in ascending node id order.
    pub fn rows(&self, nodes: &mut NodeRegistry) -> Result<Vec<NodeRow>, ArithmeticError> {
        let mut ids: Vec<_> = nodes.keys().copied().collect();
        ids.sort_unstable();

        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(node) = nodes.get_mut(&id) else {
                continue;
            };
            if !node.data_age().has_samples() {
                info!("[Report] node {} has no data age samples", id);
            }
            if !node.control_age().has_samples() {
                info!("[Report] node {} has no control age samples", id);
            }
            let mut row = node.finish(self.clock)?;
            if !self.with_fib {
                row.fib = None;
            }
            if let Some(dir) = &self.per_node_dir
                && let Some(series) = node.fib().and_then(|fib| fib.series())
            {
                let path = dir.join(format!("{id}.txt"));
                if let Err(e) = write_series(&path, series) {
                    error!("[Report] cannot write series of node {}: {}", id, e);
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Returns the number of rows written.
    pub fn write<W: Write>(&self, mut out: W, path: &Path, nodes: &mut NodeRegistry) -> Result<usize, CalcError> {
        let rows = self.rows(nodes)?;
        writeln!(out, "{}", self.header()).map_err(CalcError::io(path))?;
        for row in &rows {
            writeln!(out, "{row}").map_err(|e| CalcError::io(path)(e))?;
        }
        out.flush().map_err(CalcError::io(path))?;
        info!("[Report] wrote {} rows to {:?}", rows.len(), path);
        Ok(rows.len())
    }
}
