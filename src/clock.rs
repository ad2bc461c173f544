use crate::Timestamp;
use crate::decimal::Fixed;
use crate::error::ArithmeticError;
use num_bigint::BigInt;
use spdlog::prelude::*;

/// Min/max fold over the timestamps of one side of the simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    bounds: Option<(Timestamp, Timestamp)>,
}

impl TimeWindow {
    #[inline(always)]
    pub fn observe(&mut self, t: Timestamp) {
        self.bounds = Some(match self.bounds {
            Some((start, end)) => (start.min(t), end.max(t)),
            None => (t, t),
        });
    }

    pub fn bounds(&self) -> Option<(Timestamp, Timestamp)> {
        self.bounds
    }

    fn close(self, name: &str) -> Window {
        match self.bounds {
            Some((start, end)) => Window { start, end },
            None => {
                warn!("[Clock] no {} timestamp observed, using an empty window", name);
                Window { start: 0, end: 0 }
            }
        }
    }
}

/// A closed observation window, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    pub fn duration(&self) -> BigInt {
        BigInt::from(self.end) - self.start
    }

    /// `t - start`, or 0 for an unset time.
    pub fn relative(&self, t: Option<Timestamp>) -> i128 {
        t.map_or(0, |t| t as i128 - self.start as i128)
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Observation windows of both traces while pass 1 is running.
#[derive(Debug, Clone, Default)]
pub struct GlobalClock {
    sender: TimeWindow,
    forwarder: TimeWindow,
}

impl GlobalClock {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn observe_sender(&mut self, t: Timestamp) {
        self.sender.observe(t);
    }

    #[inline(always)]
    pub fn observe_forwarder(&mut self, t: Timestamp) {
        self.forwarder.observe(t);
    }

    pub fn sender(&self) -> &TimeWindow {
        &self.sender
    }

    pub fn forwarder(&self) -> &TimeWindow {
        &self.forwarder
    }

    /// Freezes both windows. Consuming the clock makes a second finish impossible.
    pub fn finish(self) -> Result<FinishedClock, ArithmeticError> {
        let sender = self.sender.close("sender");
        let forwarder = self.forwarder.close("forwarder");
        let sender_duration = sender.duration();
        let sender_maximum_age = Fixed::half_of(&(&sender_duration * &sender_duration))?;

        info!(
            "[Clock] senderStartTime {} senderEndTime {} senderDuration {}",
            sender.start, sender.end, sender_duration
        );
        info!(
            "[Clock] forwarderStartTime {} forwarderEndTime {} forwarderDuration {}",
            forwarder.start,
            forwarder.end,
            forwarder.duration()
        );

        Ok(FinishedClock {
            sender,
            forwarder,
            sender_duration,
            sender_maximum_age,
        })
    }
}

/// Frozen windows and the constants derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedClock {
    pub sender: Window,
    pub forwarder: Window,
    pub sender_duration: BigInt,
    /// Total age of a node that never received anything: `senderDuration² / 2`.
    pub sender_maximum_age: Fixed,
}
