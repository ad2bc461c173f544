//! Pass 2: FIB occupancy replay over the allocation trace.
//!
//! Every control packet that reaches the forwarder produces one round:
//! exactly one `A <seq>`, any number of `F <seq>`, then `T <time>`.

use crate::clock::Window;
use crate::collector::{OccupancyPoint, OutputCollector};
use crate::control::{ControlLifecycleTable, FirstEntryQueue};
use crate::decimal::{AVERAGE_SCALE, Fixed, display_opt};
use crate::delivery::PassStats;
use crate::error::{CalcError, TraceError, TraceLocation};
use crate::node::NodeRegistry;
use crate::progress::Progress;
use crate::record::AllocEvent;
use crate::{NodeId, Sequence, Timestamp};
use num_bigint::BigInt;
use spdlog::prelude::*;
use std::fmt::{Display, Formatter};
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Default)]
struct Round {
    allocator: Option<Sequence>,
    frees: Vec<Sequence>,
}

pub struct FibOccupancyEngine<'a> {
    nodes: &'a mut NodeRegistry,
    controls: &'a mut ControlLifecycleTable,
    first_entries: FirstEntryQueue,
    window: Window,
    per_node_series: bool,
    round: Round,
    touched: Vec<(NodeId, i64)>,
    entry_count: i64,
    max_entry_count: i64,
    last_commit: Timestamp,
    total_count: BigInt,
    rounds: u64,
}

impl<'a> FibOccupancyEngine<'a> {
    /// Starts with one reserved entry per known node at the window start.
    pub fn new(
        nodes: &'a mut NodeRegistry,
        controls: &'a mut ControlLifecycleTable,
        window: Window,
        per_node_series: bool,
    ) -> Self {
        for node in nodes.values_mut() {
            node.fib_or_init(&window, per_node_series);
        }
        let entry_count = nodes.len() as i64;
        Self {
            first_entries: FirstEntryQueue::new(nodes.keys().copied()),
            nodes,
            controls,
            window,
            per_node_series,
            round: Round::default(),
            touched: Vec::new(),
            entry_count,
            max_entry_count: entry_count,
            last_commit: window.start,
            total_count: BigInt::from(0),
            rounds: 0,
        }
    }

    /// Emits the level at the window start.
    pub fn open<C: OutputCollector<OccupancyPoint>>(&self, series: &mut C) {
        series.push(OccupancyPoint::new(0, self.entry_count));
    }

    pub fn apply<C: OutputCollector<OccupancyPoint>>(
        &mut self,
        event: AllocEvent,
        series: &mut C,
    ) -> Result<(), TraceError> {
        match event {
            AllocEvent::Allocate(0) => return Err(TraceError::ReservedAllocation),
            AllocEvent::Allocate(seq) => {
                if self.round.allocator.is_some() {
                    return Err(TraceError::MultipleAllocations);
                }
                self.round.allocator = Some(seq);
            }
            AllocEvent::Free(seq) => self.round.frees.push(seq),
            AllocEvent::Commit(time) => self.commit(time, series)?,
        }
        Ok(())
    }

    fn touch(&mut self, node: NodeId, delta: i64) {
        match self.touched.iter_mut().find(|(id, _)| *id == node) {
            Some((_, d)) => *d += delta,
            None => self.touched.push((node, delta)),
        }
    }

    fn commit<C: OutputCollector<OccupancyPoint>>(
        &mut self,
        time: Timestamp,
        series: &mut C,
    ) -> Result<(), TraceError> {
        let seq = self
            .round
            .allocator
            .take()
            .ok_or(TraceError::MissingAllocation)?;
        if !self.window.contains(time) {
            warn!(
                "[Fib] commit at {} outside the forwarder window [{}, {}]",
                time, self.window.start, self.window.end
            );
        }

        let owner = self.controls.allocate(seq, time)?;
        self.touch(owner, 1);
        self.first_entries.note_allocation(owner);

        let frees = std::mem::take(&mut self.round.frees);
        for &free in &frees {
            let owner = if free == 0 {
                self.first_entries.resolve_free()?
            } else {
                self.controls.free(free, time)?
            };
            self.touch(owner, -1);
        }

        for (id, delta) in std::mem::take(&mut self.touched) {
            let node = self.nodes.get_mut(&id).ok_or(TraceError::UnknownNode(id))?;
            node.fib_or_init(&self.window, self.per_node_series)
                .apply(time, delta, &self.window);
        }

        self.total_count += BigInt::from(self.entry_count) * (BigInt::from(time) - self.last_commit);
        self.last_commit = time;
        self.entry_count += 1 - frees.len() as i64;
        self.max_entry_count = self.max_entry_count.max(self.entry_count);
        self.rounds += 1;
        series.push(OccupancyPoint::new(self.window.relative(Some(time)), self.entry_count));

        self.round.frees = frees;
        self.round.frees.clear();
        Ok(())
    }

    pub fn entry_count(&self) -> i64 {
        self.entry_count
    }

    pub fn max_entry_count(&self) -> i64 {
        self.max_entry_count
    }

    pub fn total_count(&self) -> &BigInt {
        &self.total_count
    }

    /// Consumes a whole allocation trace.
    pub fn consume<R: BufRead, C: OutputCollector<OccupancyPoint>>(
        &mut self,
        reader: R,
        path: &Path,
        progress_interval: u64,
        series: &mut C,
    ) -> Result<PassStats, CalcError> {
        info!("[Fib] Reading {:?}...", path);
        let mut progress = Progress::new("Fib", progress_interval);
        let mut stats = PassStats::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| CalcError::io(path)(e))?;
            let line_no = index as u64 + 1;
            stats.lines += 1;
            progress.tick();
            let event = match line.parse::<AllocEvent>() {
                Ok(event) => event,
                Err(e) => {
                    warn!("{}:{} {}", path.display(), line_no, e);
                    stats.skipped += 1;
                    continue;
                }
            };
            self.apply(event, series).map_err(|source| CalcError::Trace {
                location: TraceLocation {
                    path: path.to_path_buf(),
                    line: line_no,
                },
                source,
            })?;
        }
        progress.finish();
        Ok(stats)
    }

    /// Closes the global integral at the window end.
    pub fn finish<C: OutputCollector<OccupancyPoint>>(mut self, series: &mut C) -> FibTotals {
        if self.round.allocator.is_some() || !self.round.frees.is_empty() {
            warn!("[Fib] allocation trace ends inside an uncommitted round, ignoring it");
        }
        let end = self.window.end;
        self.total_count += BigInt::from(self.entry_count) * (BigInt::from(end) - self.last_commit);
        series.push(OccupancyPoint::new(self.window.relative(Some(end)), self.entry_count));
        let average = Fixed::from_int(self.total_count.clone())
            .div_round(&self.window.duration(), AVERAGE_SCALE);
        let totals = FibTotals {
            rounds: self.rounds,
            entry_count: self.entry_count,
            max_entry_count: self.max_entry_count,
            total_count: self.total_count,
            average,
        };
        info!("[Fib] {}", totals);
        totals
    }
}

/// Global FIB occupancy over the forwarder window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibTotals {
    pub rounds: u64,
    /// Entries held when the trace ends.
    pub entry_count: i64,
    pub max_entry_count: i64,
    /// Entries × time.
    pub total_count: BigInt,
    pub average: Option<Fixed>,
}

impl Display for FibTotals {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "totalCount*time {} avgFibSize {} maxEntryCount {}",
            self.total_count,
            display_opt(&self.average),
            self.max_entry_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeRecord;

    fn registries(nodes: &[NodeId], controls: &[(Sequence, NodeId)]) -> (NodeRegistry, ControlLifecycleTable) {
        let mut registry = NodeRegistry::default();
        for &id in nodes {
            registry.insert(id, NodeRecord::new(id));
        }
        let mut table = ControlLifecycleTable::new();
        for &(seq, node) in controls {
            table.register(seq, node).unwrap();
        }
        (registry, table)
    }

    fn replay(engine: &mut FibOccupancyEngine<'_>, events: &[AllocEvent]) -> Result<(), TraceError> {
        for &event in events {
            engine.apply(event, &mut |_: OccupancyPoint| {})?;
        }
        Ok(())
    }

    #[test]
    fn test_single_node_rounds() {
        let (mut nodes, mut controls) = registries(&[1], &[(1, 1), (2, 1)]);
        let window = Window { start: 0, end: 30 };
        let mut engine = FibOccupancyEngine::new(&mut nodes, &mut controls, window, false);
        let mut points = Vec::new();
        let mut series = |p: OccupancyPoint| points.push(p);
        engine.open(&mut series);

        engine.apply(AllocEvent::Allocate(1), &mut series).unwrap();
        engine.apply(AllocEvent::Commit(10), &mut series).unwrap();
        assert_eq!(engine.entry_count(), 2);

        engine.apply(AllocEvent::Allocate(2), &mut series).unwrap();
        engine.apply(AllocEvent::Free(1), &mut series).unwrap();
        engine.apply(AllocEvent::Commit(20), &mut series).unwrap();
        assert_eq!(engine.entry_count(), 2);
        assert_eq!(engine.max_entry_count(), 2);

        let totals = engine.finish(&mut series);
        // 1 × 10 + 2 × 10 + 2 × 10
        assert_eq!(totals.total_count, BigInt::from(50));
        assert_eq!(totals.average.as_ref().unwrap().to_string(), "1.666667");
        assert_eq!(totals.rounds, 2);
        assert_eq!(
            points,
            vec![
                OccupancyPoint::new(0, 1),
                OccupancyPoint::new(10, 2),
                OccupancyPoint::new(20, 2),
                OccupancyPoint::new(30, 2),
            ]
        );

        assert_eq!(controls.get(1).unwrap().freed_at, Some(20));
        assert_eq!(controls.get(2).unwrap().allocated_at, Some(20));
        let fib = nodes[&1].fib().unwrap();
        assert_eq!(fib.current(), 2);
    }

    #[test]
    fn test_round_touching_several_nodes() {
        let (mut nodes, mut controls) = registries(&[1, 2], &[(1, 1), (2, 2), (3, 1)]);
        let window = Window { start: 0, end: 100 };
        let mut engine = FibOccupancyEngine::new(&mut nodes, &mut controls, window, true);
        replay(
            &mut engine,
            &[
                AllocEvent::Allocate(1),
                AllocEvent::Commit(10),
                AllocEvent::Allocate(2),
                AllocEvent::Commit(20),
                AllocEvent::Allocate(3),
                AllocEvent::Free(2),
                AllocEvent::Free(1),
                AllocEvent::Commit(40),
            ],
        )
        .unwrap();
        assert_eq!(engine.entry_count(), 3);
        assert_eq!(engine.max_entry_count(), 4);
        engine.finish(&mut |_: OccupancyPoint| {});

        // node 1: +1 at 10, then +1 -1 at 40
        let fib1 = nodes.get_mut(&1).unwrap().fib_or_init(&window, true);
        assert_eq!(fib1.current(), 2);
        let occupancy = fib1.finish(&window);
        // 1×10 + 2×30 + 2×60
        assert_eq!(occupancy.total, BigInt::from(190));
        assert_eq!(
            fib1.series().unwrap(),
            &[
                OccupancyPoint::new(0, 1),
                OccupancyPoint::new(10, 2),
                OccupancyPoint::new(40, 2),
                OccupancyPoint::new(100, 2),
            ]
        );

        // node 2: +1 at 20, -1 at 40
        let fib2 = nodes.get_mut(&2).unwrap().fib_or_init(&window, true);
        assert_eq!(fib2.current(), 1);
        let occupancy = fib2.finish(&window);
        // 1×20 + 2×20 + 1×60
        assert_eq!(occupancy.total, BigInt::from(120));
        assert_eq!(occupancy.max, 2);
    }

    #[test]
    fn test_zero_frees_follow_first_allocation_order() {
        let (mut nodes, mut controls) =
            registries(&[1, 2, 3], &[(10, 2), (11, 3), (12, 1), (13, 2), (14, 3), (15, 1)]);
        let window = Window { start: 0, end: 100 };
        let mut engine = FibOccupancyEngine::new(&mut nodes, &mut controls, window, false);
        replay(
            &mut engine,
            &[
                AllocEvent::Allocate(10),
                AllocEvent::Commit(1),
                AllocEvent::Allocate(11),
                AllocEvent::Commit(2),
                AllocEvent::Allocate(12),
                AllocEvent::Commit(3),
                AllocEvent::Allocate(13),
                AllocEvent::Free(0),
                AllocEvent::Commit(4),
            ],
        )
        .unwrap();
        // the zero-free belongs to node 2, whose own allocation cancels it
        assert_eq!(nodes[&2].fib().unwrap().current(), 2);

        let (mut nodes, mut controls) =
            registries(&[1, 2, 3], &[(10, 2), (11, 3), (12, 1), (13, 1)]);
        let mut engine = FibOccupancyEngine::new(&mut nodes, &mut controls, window, false);
        replay(
            &mut engine,
            &[
                AllocEvent::Allocate(10),
                AllocEvent::Commit(1),
                AllocEvent::Allocate(11),
                AllocEvent::Commit(2),
                AllocEvent::Allocate(12),
                AllocEvent::Commit(3),
                AllocEvent::Allocate(13),
                AllocEvent::Free(0),
                AllocEvent::Free(0),
                AllocEvent::Free(0),
                AllocEvent::Commit(4),
            ],
        )
        .unwrap();
        assert_eq!(
            engine.apply(AllocEvent::Allocate(0), &mut |_: OccupancyPoint| {}),
            Err(TraceError::ReservedAllocation)
        );
        // 2, 3 and 1 each lost their first entry, node 1 also gained one
        assert_eq!(nodes[&2].fib().unwrap().current(), 1);
        assert_eq!(nodes[&3].fib().unwrap().current(), 1);
        assert_eq!(nodes[&1].fib().unwrap().current(), 2);
    }

    #[test]
    fn test_structural_violations() {
        let (mut nodes, mut controls) = registries(&[1], &[(1, 1), (2, 1)]);
        let window = Window { start: 0, end: 100 };
        let mut engine = FibOccupancyEngine::new(&mut nodes, &mut controls, window, false);

        assert_eq!(
            engine.apply(AllocEvent::Commit(5), &mut |_: OccupancyPoint| {}),
            Err(TraceError::MissingAllocation)
        );
        engine.apply(AllocEvent::Allocate(1), &mut |_: OccupancyPoint| {}).unwrap();
        assert_eq!(
            engine.apply(AllocEvent::Allocate(2), &mut |_: OccupancyPoint| {}),
            Err(TraceError::MultipleAllocations)
        );

        let (mut nodes, mut controls) = registries(&[1], &[(1, 1)]);
        let mut engine = FibOccupancyEngine::new(&mut nodes, &mut controls, window, false);
        assert_eq!(
            replay(&mut engine, &[AllocEvent::Allocate(9), AllocEvent::Commit(5)]),
            Err(TraceError::UnknownSequence(9))
        );

        let (mut nodes, mut controls) = registries(&[1], &[(1, 1), (2, 1)]);
        let mut engine = FibOccupancyEngine::new(&mut nodes, &mut controls, window, false);
        assert_eq!(
            replay(
                &mut engine,
                &[AllocEvent::Allocate(1), AllocEvent::Free(0), AllocEvent::Free(0), AllocEvent::Commit(5)]
            ),
            Err(TraceError::EmptyFirstEntryQueue)
        );

        let (mut nodes, mut controls) = registries(&[1], &[(1, 1), (2, 1)]);
        let mut engine = FibOccupancyEngine::new(&mut nodes, &mut controls, window, false);
        assert_eq!(
            replay(&mut engine, &[AllocEvent::Allocate(1), AllocEvent::Free(2), AllocEvent::Commit(5)]),
            Err(TraceError::FreeBeforeAllocate(2))
        );
    }

    #[test]
    fn test_consume_reports_location() {
        let (mut nodes, mut controls) = registries(&[1], &[(1, 1)]);
        let window = Window { start: 0, end: 100 };
        let mut engine = FibOccupancyEngine::new(&mut nodes, &mut controls, window, false);
        let trace = "A 1\nnonsense\nT 10\nT 20\n";
        let err = engine
            .consume(trace.as_bytes(), Path::new("rcu.txt"), 0, &mut |_: OccupancyPoint| {})
            .unwrap_err();
        match err {
            CalcError::Trace { location, source } => {
                assert_eq!(location.line, 4);
                assert_eq!(source, TraceError::MissingAllocation);
                assert_eq!(location.to_string(), "rcu.txt:4");
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
