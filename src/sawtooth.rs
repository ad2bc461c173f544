//! Time integral of an observer's staleness.
//!
//! Each sample `(X, Y)` says that the value produced at update time `X` was
//! delivered at `Y`. Between deliveries the age of the freshest known value
//! grows linearly and drops at every delivery of a newer update, a sawtooth.
//! A sawtooth segment of length `L` has area `L² / 2`.
//!
//! The accumulator holds twice the area so every step stays an exact integer;
//! it is halved once in [`Sawtooth::finish`].

use crate::Timestamp;
use crate::clock::FinishedClock;
use crate::decimal::{AVERAGE_SCALE, Fixed, display_opt};
use crate::error::ArithmeticError;
use num_bigint::BigInt;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sawtooth {
    first_update: Option<Timestamp>,
    first_delivery: Option<Timestamp>,
    last_update: Option<Timestamp>,
    last_delivery: Option<Timestamp>,
    twice_area: BigInt,
}

fn square(v: BigInt) -> BigInt {
    &v * &v
}

fn diff(a: Timestamp, b: Timestamp) -> BigInt {
    BigInt::from(a) - b
}

impl Sawtooth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one sample. Returns `false` when it repeats the previous update time
    /// and therefore carries no new information.
    pub fn observe(&mut self, update: Timestamp, delivery: Timestamp) -> bool {
        let Some(old_update) = self.last_update else {
            self.first_update = Some(update);
            self.last_update = Some(update);
            self.first_delivery = Some(delivery);
            self.last_delivery = Some(delivery);
            return true;
        };
        if update == old_update {
            return false;
        }
        self.twice_area +=
            square(diff(delivery, old_update)) - square(diff(delivery, update));
        self.last_update = Some(update);
        self.extend_delivery(delivery);
        true
    }

    /// Moves the last delivery time forward without touching the area.
    pub fn extend_delivery(&mut self, delivery: Timestamp) {
        self.last_delivery = Some(self.last_delivery.map_or(delivery, |d| d.max(delivery)));
    }

    pub fn has_samples(&self) -> bool {
        self.first_update.is_some()
    }

    pub fn first_update(&self) -> Option<Timestamp> {
        self.first_update
    }

    pub fn first_delivery(&self) -> Option<Timestamp> {
        self.first_delivery
    }

    pub fn last_update(&self) -> Option<Timestamp> {
        self.last_update
    }

    pub fn last_delivery(&self) -> Option<Timestamp> {
        self.last_delivery
    }

    /// Twice the area accumulated between the first and the last sample.
    pub fn twice_area(&self) -> &BigInt {
        &self.twice_area
    }

    fn span(&self) -> BigInt {
        match (self.first_update, self.last_delivery) {
            (Some(first), Some(last)) => diff(last, first),
            _ => BigInt::from(0),
        }
    }

    /// Closes the integral over the sender window.
    pub fn finish(&self, clock: &FinishedClock) -> Result<AgeSummary, ArithmeticError> {
        let window = &clock.sender;
        let raw_total = Fixed::half_of(&self.twice_area)?;
        let span = self.span();
        let raw_average = if self.has_samples() {
            raw_total.div_round(&span, AVERAGE_SCALE)
        } else {
            None
        };

        let total = match (self.first_update, self.first_delivery, self.last_update) {
            (Some(first_update), Some(first_delivery), Some(last_update)) => {
                // area between the window start and the first delivery, minus the
                // part already attributed to the first sample
                let leading = Fixed::half_of(
                    &(square(diff(first_delivery, window.start))
                        - square(diff(first_delivery, first_update))),
                )?;
                let trailing = Fixed::half_of(&square(diff(window.end, last_update)))?;
                &(&raw_total + &leading) + &trailing
            }
            _ => clock.sender_maximum_age.clone(),
        };
        let average = total.div_round(&clock.sender_duration, AVERAGE_SCALE);

        Ok(AgeSummary {
            first_update: window.relative(self.first_update),
            first_delivery: window.relative(self.first_delivery),
            last_update: window.relative(self.last_update),
            last_delivery: window.relative(self.last_delivery),
            span,
            raw_total,
            raw_average,
            total,
            average,
        })
    }
}

/// One finalized age block of a report row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeSummary {
    pub first_update: i128,
    pub first_delivery: i128,
    pub last_update: i128,
    pub last_delivery: i128,
    pub span: BigInt,
    pub raw_total: Fixed,
    pub raw_average: Option<Fixed>,
    /// Raw total plus the leading and trailing triangles.
    pub total: Fixed,
    pub average: Option<Fixed>,
}

impl Display for AgeSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {} {}",
            self.first_update,
            self.first_delivery,
            self.last_update,
            self.last_delivery,
            self.span,
            self.raw_total,
            display_opt(&self.raw_average),
            self.total,
            display_opt(&self.average)
        )
    }
}
