use crate::decimal::{AVERAGE_SCALE, Fixed, display_opt};
use crate::error::{CalcError, TraceError};
use crate::measure::{LifetimeMeasurer, LifetimeStats};
use crate::{NodeId, Sequence, Timestamp};
use fxhash::{FxHashMap, FxHashSet};
use num_bigint::BigInt;
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

/// FIB entry lifecycle of one control packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRecord {
    pub node: NodeId,
    pub allocated_at: Option<Timestamp>,
    pub freed_at: Option<Timestamp>,
}

impl ControlRecord {
    fn new(node: NodeId) -> Self {
        Self {
            node,
            allocated_at: None,
            freed_at: None,
        }
    }

    /// How long the entry occupied the table. An entry never freed occupies it
    /// until `window_end`. `None` if the entry was never allocated.
    pub fn duration(&self, window_end: Timestamp) -> Option<i128> {
        let allocated = self.allocated_at?;
        Some(self.freed_at.unwrap_or(window_end) as i128 - allocated as i128)
    }
}

/// Control packets of the delivery trace, keyed by their line position.
#[derive(Debug, Clone, Default)]
pub struct ControlLifecycleTable {
    records: FxHashMap<Sequence, ControlRecord>,
}

impl ControlLifecycleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, seq: Sequence, node: NodeId) -> Result<(), TraceError> {
        if self.records.contains_key(&seq) {
            return Err(TraceError::DuplicateRegistration(seq));
        }
        self.records.insert(seq, ControlRecord::new(node));
        Ok(())
    }

    /// Returns the node owning the control packet.
    pub fn allocate(&mut self, seq: Sequence, time: Timestamp) -> Result<NodeId, TraceError> {
        let record = self
            .records
            .get_mut(&seq)
            .ok_or(TraceError::UnknownSequence(seq))?;
        if record.allocated_at.is_some() {
            return Err(TraceError::DuplicateAllocation(seq));
        }
        record.allocated_at = Some(time);
        Ok(record.node)
    }

    /// Returns the node owning the control packet.
    pub fn free(&mut self, seq: Sequence, time: Timestamp) -> Result<NodeId, TraceError> {
        let record = self
            .records
            .get_mut(&seq)
            .ok_or(TraceError::UnknownSequence(seq))?;
        if record.allocated_at.is_none() {
            return Err(TraceError::FreeBeforeAllocate(seq));
        }
        if record.freed_at.is_some() {
            return Err(TraceError::DuplicateFree(seq));
        }
        record.freed_at = Some(time);
        Ok(record.node)
    }

    pub fn get(&self, seq: Sequence) -> Option<&ControlRecord> {
        self.records.get(&seq)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summarize(&self, window_end: Timestamp) -> Result<ControlSummary, CalcError> {
        let mut lifetimes = LifetimeMeasurer::new()?;
        let mut dropped = 0u64;
        let mut handled = 0u64;
        let mut total_duration = BigInt::from(0);
        for record in self.records.values() {
            match record.duration(window_end) {
                Some(duration) => {
                    handled += 1;
                    total_duration += duration;
                    lifetimes.record(duration);
                }
                None => dropped += 1,
            }
        }
        let average_duration =
            Fixed::from_int(total_duration.clone()).div_round(&BigInt::from(handled), AVERAGE_SCALE);
        Ok(ControlSummary {
            dropped,
            handled,
            total_duration,
            average_duration,
            lifetimes: lifetimes.get_stats(),
        })
    }
}

/// Aggregate FIB entry lifetimes over all control packets.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSummary {
    /// Control packets that never got a FIB entry.
    pub dropped: u64,
    pub handled: u64,
    pub total_duration: BigInt,
    pub average_duration: Option<Fixed>,
    pub lifetimes: LifetimeStats,
}

impl Display for ControlSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "droppedControl {} handledControl {} totalFibEntryDuration {} avgFibEntryDuration {}",
            self.dropped,
            self.handled,
            self.total_duration,
            display_opt(&self.average_duration)
        )
    }
}

/// Resolves frees of sequence 0.
///
/// A node's very first FIB entry lives in a reserved slot that carries no
/// control-packet reference, so its free shows up as `F 0`. Nodes are queued in
/// the order their first allocation is seen and each zero-free pops the oldest.
#[derive(Debug, Default)]
pub struct FirstEntryQueue {
    pending: FxHashSet<NodeId>,
    allocated: VecDeque<NodeId>,
}

impl FirstEntryQueue {
    pub fn new(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            pending: nodes.into_iter().collect(),
            allocated: VecDeque::new(),
        }
    }

    /// Returns `true` if this was the node's first allocation.
    pub fn note_allocation(&mut self, node: NodeId) -> bool {
        if self.pending.remove(&node) {
            self.allocated.push_back(node);
            true
        } else {
            false
        }
    }

    pub fn resolve_free(&mut self) -> Result<NodeId, TraceError> {
        self.allocated
            .pop_front()
            .ok_or(TraceError::EmptyFirstEntryQueue)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn queued_len(&self) -> usize {
        self.allocated.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut table = ControlLifecycleTable::new();
        table.register(3, 7).unwrap();
        assert_eq!(table.allocate(3, 100), Ok(7));
        assert_eq!(table.free(3, 150), Ok(7));
        assert_eq!(table.get(3).unwrap().duration(1000), Some(50));
    }

    #[test]
    fn test_violations_are_reported() {
        let mut table = ControlLifecycleTable::new();
        table.register(1, 7).unwrap();
        assert_eq!(table.register(1, 8), Err(TraceError::DuplicateRegistration(1)));
        assert_eq!(table.allocate(2, 10), Err(TraceError::UnknownSequence(2)));
        assert_eq!(table.free(2, 10), Err(TraceError::UnknownSequence(2)));
        assert_eq!(table.free(1, 10), Err(TraceError::FreeBeforeAllocate(1)));
        table.allocate(1, 10).unwrap();
        assert_eq!(table.allocate(1, 11), Err(TraceError::DuplicateAllocation(1)));
        table.free(1, 20).unwrap();
        assert_eq!(table.free(1, 21), Err(TraceError::DuplicateFree(1)));
    }

    #[test]
    fn test_unfreed_entry_is_right_censored() {
        let mut table = ControlLifecycleTable::new();
        table.register(0, 1).unwrap();
        table.register(1, 1).unwrap();
        table.allocate(0, 40).unwrap();
        assert_eq!(table.get(0).unwrap().duration(100), Some(60));
        assert_eq!(table.get(1).unwrap().duration(100), None);
    }

    #[test]
    fn test_summary() {
        let mut table = ControlLifecycleTable::new();
        for seq in 0..3 {
            table.register(seq, 1).unwrap();
        }
        table.allocate(0, 10).unwrap();
        table.free(0, 30).unwrap();
        table.allocate(1, 50).unwrap();

        let summary = table.summarize(100).unwrap();
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.handled, 2);
        assert_eq!(summary.total_duration, BigInt::from(70));
        assert_eq!(summary.average_duration.as_ref().unwrap().to_string(), "35.000000");
        assert_eq!(summary.lifetimes.count, 2);
        assert_eq!(
            summary.to_string(),
            "droppedControl 1 handledControl 2 totalFibEntryDuration 70 avgFibEntryDuration 35.000000"
        );
    }

    #[test]
    fn test_first_entry_fifo_order() {
        let mut queue = FirstEntryQueue::new([10, 20, 30]);
        assert!(queue.note_allocation(10));
        assert!(queue.note_allocation(20));
        assert!(!queue.note_allocation(10));
        assert!(queue.note_allocation(30));
        assert_eq!(queue.pending_len(), 0);

        assert_eq!(queue.resolve_free(), Ok(10));
        assert_eq!(queue.resolve_free(), Ok(20));
        assert_eq!(queue.resolve_free(), Ok(30));
        assert_eq!(queue.resolve_free(), Err(TraceError::EmptyFirstEntryQueue));
    }

    #[test]
    fn test_unknown_node_is_never_queued() {
        let mut queue = FirstEntryQueue::new([1]);
        assert!(!queue.note_allocation(2));
        assert_eq!(queue.queued_len(), 0);
    }
}
