use crate::error::ArithmeticError;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, Zero};
use std::fmt::{Display, Formatter};
use std::ops::Add;

/// Scale of every reported average.
pub const AVERAGE_SCALE: u32 = 6;
/// Scale of every halved area.
pub const HALF_SCALE: u32 = 1;

/// An exact decimal number: `mantissa / 10^scale`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixed {
    mantissa: BigInt,
    scale: u32,
}

fn pow10(exp: u32) -> BigInt {
    num_traits::pow(BigInt::from(10u8), exp as usize)
}

impl Fixed {
    pub fn from_int(value: impl Into<BigInt>) -> Self {
        Self {
            mantissa: value.into(),
            scale: 0,
        }
    }

    pub fn zero() -> Self {
        Self::from_int(0)
    }

    pub fn mantissa(&self) -> &BigInt {
        &self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// `dividend / divisor` represented exactly at `scale` fractional digits.
    ///
    /// Never rounds: a quotient that needs more digits than `scale` is an error.
    pub fn div_exact(
        dividend: &BigInt,
        divisor: &BigInt,
        scale: u32,
    ) -> Result<Self, ArithmeticError> {
        let inexact = || ArithmeticError::Inexact {
            dividend: dividend.clone(),
            divisor: divisor.clone(),
            scale,
        };
        if divisor.is_zero() {
            return Err(inexact());
        }
        let (q, r) = (dividend * pow10(scale)).div_rem(divisor);
        if !r.is_zero() {
            return Err(inexact());
        }
        Ok(Self { mantissa: q, scale })
    }

    /// Exact `dividend / 2` at one fractional digit.
    pub fn half_of(dividend: &BigInt) -> Result<Self, ArithmeticError> {
        Self::div_exact(dividend, &BigInt::from(2u8), HALF_SCALE)
    }

    /// `self / divisor` at `scale` fractional digits, rounding half to even.
    ///
    /// Returns `None` for a zero divisor.
    pub fn div_round(&self, divisor: &BigInt, scale: u32) -> Option<Self> {
        if divisor.is_zero() {
            return None;
        }
        let numerator = &self.mantissa * pow10(scale);
        let denominator = divisor * pow10(self.scale);
        let (mut q, r) = numerator.div_rem(&denominator);
        if !r.is_zero() {
            let twice = r.abs() * 2u8;
            let den = denominator.abs();
            let round_away = twice > den || (twice == den && q.is_odd());
            if round_away {
                if numerator.is_negative() != denominator.is_negative() {
                    q -= 1u8;
                } else {
                    q += 1u8;
                }
            }
        }
        Some(Self { mantissa: q, scale })
    }

    fn rescaled(&self, scale: u32) -> BigInt {
        &self.mantissa * pow10(scale - self.scale)
    }
}

impl Add for &Fixed {
    type Output = Fixed;

    fn add(self, rhs: &Fixed) -> Fixed {
        let scale = self.scale.max(rhs.scale);
        Fixed {
            mantissa: self.rescaled(scale) + rhs.rescaled(scale),
            scale,
        }
    }
}

impl Add for Fixed {
    type Output = Fixed;

    fn add(self, rhs: Fixed) -> Fixed {
        &self + &rhs
    }
}

impl Display for Fixed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let digits = self.mantissa.abs().to_string();
        let sign = if self.mantissa.is_negative() { "-" } else { "" };
        if self.scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let scale = self.scale as usize;
        let digits = format!("{digits:0>width$}", width = scale + 1);
        let (int, frac) = digits.split_at(digits.len() - scale);
        write!(f, "{sign}{int}.{frac}")
    }
}

/// Formats an optional average the way the report prints it.
pub(crate) fn display_opt(value: &Option<Fixed>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big(v: i64) -> BigInt {
        BigInt::from(v)
    }

    #[test]
    fn test_half_of_is_exact_for_odd_values() {
        assert_eq!(Fixed::half_of(&big(5)).unwrap().to_string(), "2.5");
        assert_eq!(Fixed::half_of(&big(8)).unwrap().to_string(), "4.0");
        assert_eq!(Fixed::half_of(&big(0)).unwrap().to_string(), "0.0");
        assert_eq!(Fixed::half_of(&big(-3)).unwrap().to_string(), "-1.5");
    }

    #[test]
    fn test_div_exact_fails_instead_of_rounding() {
        let err = Fixed::div_exact(&big(1), &big(4), 1).unwrap_err();
        assert!(matches!(err, ArithmeticError::Inexact { scale: 1, .. }));
        assert_eq!(
            Fixed::div_exact(&big(1), &big(4), 2).unwrap().to_string(),
            "0.25"
        );
    }

    #[test]
    fn test_div_round_half_even() {
        let v = Fixed::from_int(5);
        // 5 / 2 at scale 0 -> 2.5 -> 2
        assert_eq!(v.div_round(&big(2), 0).unwrap().to_string(), "2");
        let v = Fixed::from_int(7);
        // 7 / 2 -> 3.5 -> 4
        assert_eq!(v.div_round(&big(2), 0).unwrap().to_string(), "4");
        let v = Fixed::from_int(-7);
        assert_eq!(v.div_round(&big(2), 0).unwrap().to_string(), "-4");
        let v = Fixed::from_int(2);
        assert_eq!(v.div_round(&big(3), 6).unwrap().to_string(), "0.666667");
        assert!(v.div_round(&big(0), 6).is_none());
    }

    #[test]
    fn test_div_round_respects_source_scale() {
        let v = Fixed::half_of(&big(25)).unwrap(); // 12.5
        assert_eq!(v.div_round(&big(4), 6).unwrap().to_string(), "3.125000");
        let tiny = Fixed::half_of(&big(1)).unwrap(); // 0.5
        assert_eq!(tiny.div_round(&big(1_000_000), 6).unwrap().to_string(), "0.000000");
        assert_eq!(tiny.div_round(&big(333_333), 6).unwrap().to_string(), "0.000002");
    }

    #[test]
    fn test_add_aligns_scales() {
        let a = Fixed::half_of(&big(3)).unwrap(); // 1.5
        let b = Fixed::from_int(2);
        assert_eq!((&a + &b).to_string(), "3.5");
        assert_eq!(display_opt(&None), "null");
    }
}
