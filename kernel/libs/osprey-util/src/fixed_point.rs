//! A lightweight signed fixed-point number for scheduler arithmetic.
//!
//! The multi-level feedback queue scheduler maintains `load_avg` and each
//! thread's `recent_cpu` as real numbers, but the kernel has no floating
//! point. `Fixed` stores them in 17.14 format: an `i32` whose lower 14
//! bits are the fractional part.

use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Sub};

const FRAC_BITS: u32 = 14;
const FRAC_SCALE: i32 = 1 << FRAC_BITS;

/// A signed 17.14 fixed-point number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(FRAC_SCALE);

    /// Creates a fixed-point number from an integer.
    pub const fn from_int(val: i32) -> Self {
        Self(val * FRAC_SCALE)
    }

    /// Reconstitutes a value from raw bits (for storage in plain
    /// integer fields).
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw bit pattern.
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Creates a fixed-point number from a ratio of two integers.
    ///
    /// # Panics
    ///
    /// Panics if `denom` is zero.
    pub const fn from_ratio(num: i32, denom: i32) -> Self {
        Self((num as i64 * FRAC_SCALE as i64 / denom as i64) as i32)
    }

    /// Converts to an integer, truncating toward zero.
    pub const fn to_int(self) -> i32 {
        self.0 / FRAC_SCALE
    }

    /// Converts to an integer, rounding to nearest.
    pub const fn to_int_round(self) -> i32 {
        if self.0 >= 0 {
            (self.0 + FRAC_SCALE / 2) / FRAC_SCALE
        } else {
            (self.0 - FRAC_SCALE / 2) / FRAC_SCALE
        }
    }

    /// Multiplies by an integer.
    pub const fn mul_int(self, val: i32) -> Self {
        Self(self.0 * val)
    }

    /// Divides by an integer.
    pub const fn div_int(self, val: i32) -> Self {
        Self(self.0 / val)
    }
}

impl Add for Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul for Fixed {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        // The intermediate product needs 64 bits before the scale is
        // divided back out.
        Self((self.0 as i64 * rhs.0 as i64 >> FRAC_BITS) as i32)
    }
}

impl Div for Fixed {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        Self(((self.0 as i64) * FRAC_SCALE as i64 / rhs.0 as i64) as i32)
    }
}

impl Neg for Fixed {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let int = self.0 / FRAC_SCALE;
        let frac = (self.0.unsigned_abs() as u64 % FRAC_SCALE as u64) * 100 / FRAC_SCALE as u64;
        write!(f, "{}.{:02}", int, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip() {
        for val in [-60, -1, 0, 1, 17, 63] {
            assert_eq!(Fixed::from_int(val).to_int(), val);
        }
    }

    #[test]
    fn ratio_and_round() {
        let half = Fixed::from_ratio(1, 2);
        assert_eq!(half.to_int(), 0);
        assert_eq!(half.to_int_round(), 1);
        assert_eq!((-half).to_int_round(), -1);

        let third = Fixed::from_ratio(1, 3);
        assert_eq!((third + third + third).to_int_round(), 1);
    }

    #[test]
    fn load_avg_update_shape() {
        // One ready thread at a steady state drives load_avg toward 1.0:
        // load_avg = (59/60) * load_avg + (1/60) * 1.
        let decay = Fixed::from_ratio(59, 60);
        let gain = Fixed::from_ratio(1, 60);
        let mut load_avg = Fixed::ZERO;
        for _ in 0..600 {
            load_avg = decay * load_avg + gain.mul_int(1);
        }
        assert_eq!(load_avg.to_int_round(), 1);
    }

    #[test]
    fn recent_cpu_decay() {
        // recent_cpu = (2*load)/(2*load+1) * recent_cpu + nice.
        let load = Fixed::from_int(1);
        let coeff = load.mul_int(2) / (load.mul_int(2) + Fixed::ONE);
        let mut recent = Fixed::from_int(60);
        for _ in 0..100 {
            recent = coeff * recent + Fixed::from_int(0);
        }
        assert_eq!(recent.to_int_round(), 0);
    }
}
