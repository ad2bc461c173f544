//! Pass 1: the delivery trace.

use crate::clock::GlobalClock;
use crate::control::ControlLifecycleTable;
use crate::error::{CalcError, TraceError, TraceLocation};
use crate::node::{DataOutcome, NodeRecord, NodeRegistry};
use crate::progress::Progress;
use crate::record::{DataRecord, DeliveryRecord, LineHead};
use crate::{Sequence, Timestamp};
use spdlog::prelude::*;
use std::io::BufRead;
use std::path::Path;

/// Line counts of a finished pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub lines: u64,
    pub skipped: u64,
}

/// Feeds delivery records into the clock and the registries.
pub struct DeliveryPass<'a> {
    clock: &'a mut GlobalClock,
    nodes: &'a mut NodeRegistry,
    controls: &'a mut ControlLifecycleTable,
}

impl<'a> DeliveryPass<'a> {
    pub fn new(
        clock: &'a mut GlobalClock,
        nodes: &'a mut NodeRegistry,
        controls: &'a mut ControlLifecycleTable,
    ) -> Self {
        Self {
            clock,
            nodes,
            controls,
        }
    }

    /// Registers the node and widens the sender window. Every line with a
    /// readable head does this, even one that is skipped afterwards.
    pub fn apply_head(&mut self, head: LineHead) -> &mut NodeRecord {
        self.clock.observe_sender(head.send_time);
        self.nodes
            .entry(head.node)
            .or_insert_with(|| NodeRecord::new(head.node))
    }

    /// `position` is the 0-based line index; control packets are known by it.
    pub fn apply(&mut self, position: Sequence, record: DeliveryRecord) -> Result<(), TraceError> {
        match record {
            DeliveryRecord::Control { node: id, send_time } => {
                self.apply_head(LineHead { node: id, send_time })
                    .set_expected_control(send_time);
                self.controls.register(position, id)?;
            }
            DeliveryRecord::Data(data) => {
                let node = self.apply_head(LineHead {
                    node: data.node,
                    send_time: data.t3,
                });
                if data.is_dropped() {
                    node.record_dropped();
                } else {
                    node.observe_control_age(data.t1, data.t8);
                    if node.observe_data_age(data.t3, data.t1, data.t8) == DataOutcome::MisAddressed {
                        debug!(
                            "[Delivery] node {} expects control {:?}, packet addressed with {}",
                            data.node,
                            node.expected_control(),
                            data.t1
                        );
                    }
                    observe_delivered(self.clock, &data);
                }
            }
        }
        Ok(())
    }

    /// Consumes a whole trace. Malformed lines are skipped, state violations abort.
    pub fn consume<R: BufRead>(
        &mut self,
        reader: R,
        path: &Path,
        progress_interval: u64,
    ) -> Result<PassStats, CalcError> {
        info!("[Delivery] Reading {:?}...", path);
        let mut progress = Progress::new("Delivery", progress_interval);
        let mut stats = PassStats::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| CalcError::io(path)(e))?;
            let position = index as Sequence;
            stats.lines += 1;
            progress.tick();
            let record = match DeliveryRecord::parse(&line) {
                Ok(record) => record,
                Err(malformed) => {
                    if let Some(head) = malformed.head {
                        self.apply_head(head);
                    }
                    warn!("{}:{} {}", path.display(), position + 1, malformed.error);
                    stats.skipped += 1;
                    continue;
                }
            };
            self.apply(position, record).map_err(|source| CalcError::Trace {
                location: TraceLocation {
                    path: path.to_path_buf(),
                    line: position + 1,
                },
                source,
            })?;
        }
        progress.finish();
        info!(
            "[Delivery] nodes {} controlPackets {} skipped {}",
            self.nodes.len(),
            self.controls.len(),
            stats.skipped
        );
        Ok(stats)
    }
}

fn observe_delivered(clock: &mut GlobalClock, data: &DataRecord) {
    clock.observe_sender(data.t8);
    let forwarder: [Option<Timestamp>; 3] = [(data.t2 != 0).then_some(data.t2), Some(data.t4), Some(data.t7)];
    for t in forwarder.into_iter().flatten() {
        clock.observe_forwarder(t);
    }
}
