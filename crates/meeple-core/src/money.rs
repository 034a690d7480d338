//! # Money Module
//!
//! Provides the `Money` type for yen amounts held in minor units.
//!
//! ## Minor Units
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  100 minor units = ¥1                                                   │
//! │                                                                         │
//! │    ¥500 / hour      →  50_000 minor                                    │
//! │    ¥3,000 of food   → 300_000 minor                                    │
//! │                                                                         │
//! │  Conversions to whole yen TRUNCATE (points are earned on whole yen).   │
//! │  Overage charges round to the nearest ¥10 (1_000 minor).              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use meeple_core::money::Money;
//!
//! let seat = Money::from_yen(500);
//! assert_eq!(seat.minor(), 50_000);
//! assert_eq!(Money::from_minor(12_345).yen(), 123);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::MINOR_UNITS_PER_YEN;

/// Granularity of overage charges: ¥10.
const TEN_YEN_MINOR: i64 = 10 * MINOR_UNITS_PER_YEN;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in minor units (1/100 yen).
///
/// Signed so that refunds and adjustments can be expressed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Creates a Money value from whole yen.
    #[inline]
    pub const fn from_yen(yen: i64) -> Self {
        Money(yen * MINOR_UNITS_PER_YEN)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns whole yen, truncating any fractional part toward zero.
    ///
    /// ```rust
    /// use meeple_core::money::Money;
    ///
    /// assert_eq!(Money::from_minor(500_099).yen(), 5_000);
    /// ```
    #[inline]
    pub const fn yen(&self) -> i64 {
        self.0 / MINOR_UNITS_PER_YEN
    }

    /// Returns the sub-yen part (always 0-99).
    #[inline]
    pub const fn sen_part(&self) -> i64 {
        (self.0 % MINOR_UNITS_PER_YEN).abs()
    }

    /// Zero yen.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Drops any sub-yen remainder, rounding toward negative infinity.
    ///
    /// Seat charges are floored so that a running timer never shows a
    /// fractional yen.
    #[inline]
    pub const fn floor_to_yen(&self) -> Self {
        Money(self.0.div_euclid(MINOR_UNITS_PER_YEN) * MINOR_UNITS_PER_YEN)
    }

    /// Rounds a raw minor-unit amount to the nearest ¥10.
    ///
    /// `round(raw / 1000) * 1000`, half away from zero.
    ///
    /// ```rust
    /// use meeple_core::money::Money;
    ///
    /// // 3h × ¥333.33/h = ¥999.99 → ¥1,000
    /// assert_eq!(Money::round_to_ten_yen(99_999.0).minor(), 100_000);
    /// assert_eq!(Money::round_to_ten_yen(1_499.0).minor(), 1_000);
    /// assert_eq!(Money::round_to_ten_yen(1_500.0).minor(), 2_000);
    /// ```
    pub fn round_to_ten_yen(raw_minor: f64) -> Self {
        let tens = (raw_minor / TEN_YEN_MINOR as f64).round() as i64;
        Money(tens * TEN_YEN_MINOR)
    }

    /// Charges `hours` at `hourly_rate`, rounded to the nearest minor unit.
    ///
    /// ```rust
    /// use meeple_core::money::Money;
    ///
    /// let charge = Money::from_minor(50_000).for_hours(1.5);
    /// assert_eq!(charge.minor(), 75_000);
    /// ```
    pub fn for_hours(&self, hours: f64) -> Money {
        Money((hours * self.0 as f64).round() as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display, e.g. `¥1234.50`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}¥{}.{:02}", sign, self.yen().abs(), self.sen_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
