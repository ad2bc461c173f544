use crate::clock::{FinishedClock, Window};
use crate::collector::OccupancyPoint;
use crate::decimal::{AVERAGE_SCALE, Fixed, display_opt};
use crate::error::ArithmeticError;
use crate::sawtooth::{AgeSummary, Sawtooth};
use crate::{NodeId, Timestamp};
use fxhash::FxHashMap;
use num_bigint::BigInt;
use std::fmt::{Display, Formatter};

pub type NodeRegistry = FxHashMap<NodeId, NodeRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOutcome {
    Correct,
    /// Sent before the node's latest control update reached the source.
    MisAddressed,
}

/// Occupancy of one node's FIB entries over the forwarder window.
#[derive(Debug, Clone)]
pub struct FibTrack {
    current: i64,
    max: i64,
    last_update: Timestamp,
    total: BigInt,
    series: Option<Vec<OccupancyPoint>>,
}

impl FibTrack {
    /// Every node starts with its reserved first entry.
    pub fn new(window: &Window, with_series: bool) -> Self {
        Self {
            current: 1,
            max: 1,
            last_update: window.start,
            total: BigInt::from(0),
            series: with_series.then(|| vec![OccupancyPoint::new(0, 1)]),
        }
    }

    pub fn apply(&mut self, time: Timestamp, delta: i64, window: &Window) {
        self.total += BigInt::from(self.current) * (BigInt::from(time) - self.last_update);
        self.current += delta;
        self.max = self.max.max(self.current);
        self.last_update = time;
        if let Some(series) = &mut self.series {
            series.push(OccupancyPoint::new(window.relative(Some(time)), self.current));
        }
    }

    pub fn current(&self) -> i64 {
        self.current
    }

    /// Closes the integral at the window end.
    pub fn finish(&mut self, window: &Window) -> NodeOccupancy {
        if self.last_update != window.end {
            self.total += BigInt::from(self.current) * (BigInt::from(window.end) - self.last_update);
            self.last_update = window.end;
            if let Some(series) = &mut self.series {
                series.push(OccupancyPoint::new(window.relative(Some(window.end)), self.current));
            }
        }
        NodeOccupancy {
            max: self.max,
            average: Fixed::from_int(self.total.clone()).div_round(&window.duration(), AVERAGE_SCALE),
            total: self.total.clone(),
        }
    }

    pub fn series(&self) -> Option<&[OccupancyPoint]> {
        self.series.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOccupancy {
    pub max: i64,
    /// Entries × time.
    pub total: BigInt,
    pub average: Option<Fixed>,
}

impl Display for NodeOccupancy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.max, self.total, display_opt(&self.average))
    }
}

/// Everything known about one node.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: NodeId,
    expected_control: Option<Timestamp>,
    pub correct_received: u64,
    pub dropped: u64,
    pub mis_addressed: u64,
    data_age: Sawtooth,
    control_age: Sawtooth,
    fib: Option<FibTrack>,
}

impl NodeRecord {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            expected_control: None,
            correct_received: 0,
            dropped: 0,
            mis_addressed: 0,
            data_age: Sawtooth::new(),
            control_age: Sawtooth::new(),
            fib: None,
        }
    }

    pub fn set_expected_control(&mut self, t: Timestamp) {
        self.expected_control = Some(t);
    }

    pub fn expected_control(&self) -> Option<Timestamp> {
        self.expected_control
    }

    pub fn record_dropped(&mut self) {
        self.dropped += 1;
    }

    /// `t1` is the control update the source addressed the packet with.
    pub fn observe_control_age(&mut self, t1: Timestamp, t8: Timestamp) {
        if t1 == 0 {
            return;
        }
        self.control_age.observe(t1, t8);
    }

    pub fn observe_data_age(&mut self, t3: Timestamp, t1: Timestamp, t8: Timestamp) -> DataOutcome {
        if self.expected_control.is_some_and(|expected| t1 < expected) {
            self.mis_addressed += 1;
            return DataOutcome::MisAddressed;
        }
        self.correct_received += 1;
        self.data_age.observe(t3, t8);
        // every correct packet counts as a delivery, even a repeated update
        self.data_age.extend_delivery(t8);
        DataOutcome::Correct
    }

    pub fn data_age(&self) -> &Sawtooth {
        &self.data_age
    }

    pub fn control_age(&self) -> &Sawtooth {
        &self.control_age
    }

    pub fn fib(&self) -> Option<&FibTrack> {
        self.fib.as_ref()
    }

    pub fn fib_or_init(&mut self, window: &Window, with_series: bool) -> &mut FibTrack {
        self.fib.get_or_insert_with(|| FibTrack::new(window, with_series))
    }

    pub fn finish(&mut self, clock: &FinishedClock) -> Result<NodeRow, ArithmeticError> {
        let forwarder = clock.forwarder;
        Ok(NodeRow {
            id: self.id,
            correct_received: self.correct_received,
            dropped: self.dropped,
            mis_addressed: self.mis_addressed,
            data: self.data_age.finish(clock)?,
            control: self.control_age.finish(clock)?,
            fib: self.fib.as_mut().map(|fib| fib.finish(&forwarder)),
        })
    }
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    pub id: NodeId,
    pub correct_received: u64,
    pub dropped: u64,
    pub mis_addressed: u64,
    pub data: AgeSummary,
    pub control: AgeSummary,
    pub fib: Option<NodeOccupancy>,
}

impl Display for NodeRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.id, self.correct_received, self.dropped, self.mis_addressed, self.data, self.control
        )?;
        if let Some(fib) = &self.fib {
            write!(f, " {fib}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Window = Window { start: 100, end: 200 };

    #[test]
    fn test_mis_addressed_adds_no_area() {
        let mut node = NodeRecord::new(1);
        node.set_expected_control(50);
        assert_eq!(node.observe_data_age(10, 50, 20), DataOutcome::Correct);
        assert_eq!(node.observe_data_age(30, 60, 40), DataOutcome::Correct);
        let area = node.data_age().twice_area().clone();

        node.set_expected_control(70);
        assert_eq!(node.observe_data_age(35, 60, 90), DataOutcome::MisAddressed);
        assert_eq!(node.mis_addressed, 1);
        assert_eq!(node.correct_received, 2);
        assert_eq!(node.data_age().twice_area(), &area);
        assert_eq!(node.data_age().last_delivery(), Some(40));
        assert_eq!(node.data_age().last_update(), Some(30));
    }

    #[test]
    fn test_repeated_source_time_still_extends_delivery() {
        let mut node = NodeRecord::new(1);
        node.observe_data_age(10, 0, 20);
        node.observe_data_age(10, 0, 35);
        assert_eq!(node.data_age().last_delivery(), Some(35));
        assert_eq!(node.correct_received, 2);
    }

    #[test]
    fn test_control_age_ignores_zero_update() {
        let mut node = NodeRecord::new(1);
        node.observe_control_age(0, 20);
        assert!(!node.control_age().has_samples());
        node.observe_control_age(5, 20);
        assert!(node.control_age().has_samples());
    }

    #[test]
    fn test_fib_track_integral() {
        let mut fib = FibTrack::new(&WINDOW, true);
        fib.apply(110, 1, &WINDOW); // 1 × 10
        fib.apply(150, -1, &WINDOW); // 2 × 40
        let occupancy = fib.finish(&WINDOW); // 1 × 50
        assert_eq!(occupancy.total, BigInt::from(140));
        assert_eq!(occupancy.max, 2);
        assert_eq!(occupancy.to_string(), "2 140 1.400000");
        assert_eq!(
            fib.series().unwrap(),
            &[
                OccupancyPoint::new(0, 1),
                OccupancyPoint::new(10, 2),
                OccupancyPoint::new(50, 1),
                OccupancyPoint::new(100, 1),
            ]
        );
    }

    #[test]
    fn test_fib_track_update_at_window_end_adds_no_point() {
        let mut fib = FibTrack::new(&WINDOW, true);
        fib.apply(200, 1, &WINDOW);
        let occupancy = fib.finish(&WINDOW);
        assert_eq!(occupancy.total, BigInt::from(100));
        assert_eq!(fib.series().unwrap().len(), 2);
    }

    #[test]
    fn test_fib_series_is_lazy() {
        let fib = FibTrack::new(&WINDOW, false);
        assert!(fib.series().is_none());
    }
}
