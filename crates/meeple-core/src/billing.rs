//! # Seat-Time Billing
//!
//! Converts elapsed seat time into a charge under a tiered rate table.
//!
//! ## Charge Curve
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  charge                                                                 │
//! │    ▲                                                                    │
//! │    │                                  ┌────────────────── DAY_CAP       │
//! │    │                          ╱╱╱╱╱╱╱╱┘  (flat from 5h on)             │
//! │    │                 ╱╱╱╱╱╱╱╱╱  THREE_HOUR (discounted rate)           │
//! │    │              ╱╱                                                    │
//! │    │          ╱╱╱  STANDARD                                             │
//! │    │       ╱╱                                                           │
//! │    │──────┘ GRACE (free)                                                │
//! │    └──────┬──────────────┬──────────────┬─────────────────► minutes    │
//! │           5             180            300                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Monotonicity
//! Billable minutes (elapsed minus grace) accrue at the standard rate up to
//! the 3-hour boundary and at the discounted rate after it. The accrued sum
//! is floored to whole yen and clamped to the day cap; from the 5-hour
//! boundary on the charge IS the day cap. Every step is non-decreasing in
//! elapsed minutes, so a running timer polled every second never shows a
//! smaller amount than it showed before.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::validation::ValidationResult;

const MINUTES_PER_HOUR: i128 = 60;

// =============================================================================
// Rate Table
// =============================================================================

/// Rate schedule for seat time.
///
/// ## Example Config
/// ```toml
/// [billing]
/// grace_minutes = 5
/// hourly_rate_minor = 50000             # ¥500 / hour
/// discounted_hourly_rate_minor = 20000  # ¥200 / hour after 3 hours
/// three_hour_minutes = 180
/// day_cap_minutes = 300
/// day_cap_minor = 180000                # ¥1,800 ceiling
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct RateTable {
    /// Elapsed minutes at or below this are free.
    pub grace_minutes: i64,

    /// Standard rate in minor units per hour.
    pub hourly_rate_minor: i64,

    /// Rate for minutes past the 3-hour boundary.
    pub discounted_hourly_rate_minor: i64,

    /// Elapsed minutes after which the discounted rate applies.
    pub three_hour_minutes: i64,

    /// Elapsed minutes from which the day cap is charged flat.
    pub day_cap_minutes: i64,

    /// The day-rate ceiling in minor units.
    pub day_cap_minor: i64,
}

impl Default for RateTable {
    fn default() -> Self {
        RateTable {
            grace_minutes: 5,
            hourly_rate_minor: 50_000,
            discounted_hourly_rate_minor: 20_000,
            three_hour_minutes: 180,
            day_cap_minutes: 300,
            day_cap_minor: 180_000,
        }
    }
}

impl RateTable {
    /// Checks that thresholds are ordered and amounts are non-negative.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.grace_minutes < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "grace_minutes".to_string(),
            });
        }

        if self.three_hour_minutes <= self.grace_minutes {
            return Err(ValidationError::OutOfRange {
                field: "three_hour_minutes".to_string(),
                min: self.grace_minutes + 1,
                max: i64::MAX,
            });
        }

        if self.day_cap_minutes <= self.three_hour_minutes {
            return Err(ValidationError::OutOfRange {
                field: "day_cap_minutes".to_string(),
                min: self.three_hour_minutes + 1,
                max: i64::MAX,
            });
        }

        for (field, value) in [
            ("hourly_rate_minor", self.hourly_rate_minor),
            ("discounted_hourly_rate_minor", self.discounted_hourly_rate_minor),
            ("day_cap_minor", self.day_cap_minor),
        ] {
            if value < 0 {
                return Err(ValidationError::MustNotBeNegative {
                    field: field.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Prices a stay of `elapsed_minutes`.
    ///
    /// Negative input is treated as zero; callers go through
    /// [`calculate_time_charge`] which rejects inverted intervals first.
    pub fn charge_for_minutes(&self, elapsed_minutes: i64) -> TimeCharge {
        let elapsed = elapsed_minutes.max(0);
        let grace_waived = elapsed.min(self.grace_minutes);

        if elapsed <= self.grace_minutes {
            return TimeCharge {
                elapsed_minutes: elapsed,
                total_charge_minor: 0,
                rate_applied: RateTier::Grace,
                breakdown: ChargeBreakdown {
                    within_grace_period: true,
                    grace_minutes_waived: grace_waived,
                    standard_minutes: 0,
                    discounted_minutes: 0,
                    capped: false,
                },
            };
        }

        let billable = elapsed - self.grace_minutes;
        let standard_window = (self.three_hour_minutes - self.grace_minutes).max(0);
        let standard_minutes = billable.min(standard_window);
        let discounted_minutes = billable - standard_minutes;

        let accrued = (standard_minutes as i128 * self.hourly_rate_minor as i128
            + discounted_minutes as i128 * self.discounted_hourly_rate_minor as i128)
            / MINUTES_PER_HOUR;
        let blended = Money::from_minor(accrued as i64).floor_to_yen();
        let cap = Money::from_minor(self.day_cap_minor);

        let (total, rate_applied, capped) = if elapsed >= self.day_cap_minutes || blended >= cap {
            (cap, RateTier::DayCap, true)
        } else if discounted_minutes > 0 {
            (blended, RateTier::ThreeHour, false)
        } else {
            (blended, RateTier::Standard, false)
        };

        TimeCharge {
            elapsed_minutes: elapsed,
            total_charge_minor: total.minor(),
            rate_applied,
            breakdown: ChargeBreakdown {
                within_grace_period: false,
                grace_minutes_waived: grace_waived,
                standard_minutes,
                discounted_minutes,
                capped,
            },
        }
    }
}

// =============================================================================
// Charge Output
// =============================================================================

/// Which part of the rate table priced a stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateTier {
    /// Inside the grace period, nothing charged.
    Grace,
    /// Standard hourly rate.
    Standard,
    /// Past the 3-hour boundary, discounted rate on the extra minutes.
    ThreeHour,
    /// Day-rate ceiling reached.
    DayCap,
}

impl RateTier {
    /// Short tag shown on receipts.
    pub fn as_tag(&self) -> &'static str {
        match self {
            RateTier::Grace => "grace",
            RateTier::Standard => "standard",
            RateTier::ThreeHour => "3hour",
            RateTier::DayCap => "5hour",
        }
    }
}

/// How a charge was assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ChargeBreakdown {
    /// The whole stay fell inside the grace period.
    pub within_grace_period: bool,
    /// Minutes exempted from charge by the grace period.
    pub grace_minutes_waived: i64,
    /// Billable minutes at the standard rate.
    pub standard_minutes: i64,
    /// Billable minutes at the discounted rate.
    pub discounted_minutes: i64,
    /// The day cap set the total.
    pub capped: bool,
}

/// A computed seat-time charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TimeCharge {
    pub elapsed_minutes: i64,
    pub total_charge_minor: i64,
    pub rate_applied: RateTier,
    pub breakdown: ChargeBreakdown,
}

impl TimeCharge {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_minor(self.total_charge_minor)
    }
}

// =============================================================================
// Calculator
// =============================================================================

/// Prices the interval `started_at .. ended_at.unwrap_or(now)`.
///
/// ## Errors
/// - [`CoreError::StartInFuture`] if `started_at` is after `now`
/// - [`CoreError::EndBeforeStart`] if `ended_at` precedes `started_at`
///
/// ## Example
/// ```rust
/// use chrono::{Duration, Utc};
/// use meeple_core::billing::{calculate_time_charge, RateTable, RateTier};
///
/// let now = Utc::now();
/// let charge = calculate_time_charge(&RateTable::default(), now - Duration::minutes(3), None, now)
///     .unwrap();
/// assert_eq!(charge.total_charge_minor, 0);
/// assert_eq!(charge.rate_applied, RateTier::Grace);
/// ```
pub fn calculate_time_charge(
    rates: &RateTable,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CoreResult<TimeCharge> {
    if started_at > now {
        return Err(CoreError::StartInFuture { started_at, now });
    }

    let end = ended_at.unwrap_or(now);
    if end < started_at {
        return Err(CoreError::EndBeforeStart {
            started_at,
            ended_at: end,
        });
    }

    let elapsed_minutes = (end - started_at).num_minutes();
    Ok(rates.charge_for_minutes(elapsed_minutes))
}

/// Parses an RFC 3339 timestamp coming from the timer UI.
pub fn parse_timestamp(field: &str, value: &str) -> ValidationResult<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: e.to_string(),
        })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn charge(minutes: i64) -> TimeCharge {
        RateTable::default().charge_for_minutes(minutes)
    }

    #[test]
    fn test_grace_period_is_free() {
        for minutes in 0..=5 {
            let c = charge(minutes);
            assert_eq!(c.total_charge_minor, 0, "minute {}", minutes);
            assert_eq!(c.rate_applied, RateTier::Grace);
            assert!(c.breakdown.within_grace_period);
        }

        let c = charge(6);
        assert!(c.total_charge_minor > 0);
        assert_eq!(c.breakdown.grace_minutes_waived, 5);
        assert!(!c.breakdown.within_grace_period);
    }

    #[test]
    fn test_standard_rate() {
        // 65 minutes elapsed, 60 billable at ¥500/h
        let c = charge(65);
        assert_eq!(c.total_charge_minor, 50_000);
        assert_eq!(c.rate_applied, RateTier::Standard);
        assert_eq!(c.breakdown.standard_minutes, 60);
    }

    #[test]
    fn test_three_hour_boundary_never_decreases() {
        let before = charge(179);
        let after = charge(181);
        assert!(before.total_charge_minor <= after.total_charge_minor);
        assert_eq!(before.rate_applied, RateTier::Standard);
        assert_eq!(after.rate_applied, RateTier::ThreeHour);
        assert_eq!(after.breakdown.discounted_minutes, 1);
    }

    #[test]
    fn test_day_cap_is_flat() {
        let c301 = charge(301);
        let c600 = charge(600);
        assert_eq!(c301.total_charge_minor, c600.total_charge_minor);
        assert_eq!(c301.total_charge_minor, 180_000);
        assert_eq!(c600.rate_applied, RateTier::DayCap);
        assert!(c600.breakdown.capped);
    }

    #[test]
    fn test_monotonic_over_a_full_day() {
        let rates = RateTable::default();
        let mut previous = 0;
        for minutes in 0..=24 * 60 {
            let total = rates.charge_for_minutes(minutes).total_charge_minor;
            assert!(total >= previous, "charge dropped at minute {}", minutes);
            previous = total;
        }
    }

    #[test]
    fn test_monotonic_with_low_cap() {
        // Cap lower than the 3-hour accrual: clamps early, still monotone
        let rates = RateTable {
            day_cap_minor: 100_000,
            ..RateTable::default()
        };
        let mut previous = 0;
        for minutes in 0..=400 {
            let c = rates.charge_for_minutes(minutes);
            assert!(c.total_charge_minor >= previous);
            assert!(c.total_charge_minor <= 100_000);
            previous = c.total_charge_minor;
        }
        assert_eq!(rates.charge_for_minutes(150).rate_applied, RateTier::DayCap);
    }

    #[test]
    fn test_charges_are_whole_yen() {
        let rates = RateTable::default();
        for minutes in 0..=300 {
            assert_eq!(rates.charge_for_minutes(minutes).total_charge_minor % 100, 0);
        }
    }

    #[test]
    fn test_calculate_rejects_future_start() {
        let now = Utc::now();
        let result = calculate_time_charge(
            &RateTable::default(),
            now + Duration::minutes(1),
            None,
            now,
        );
        assert!(matches!(result, Err(CoreError::StartInFuture { .. })));
    }

    #[test]
    fn test_calculate_rejects_inverted_interval() {
        let now = Utc::now();
        let started = now - Duration::hours(1);
        let result = calculate_time_charge(
            &RateTable::default(),
            started,
            Some(started - Duration::minutes(1)),
            now,
        );
        assert!(matches!(result, Err(CoreError::EndBeforeStart { .. })));
    }

    #[test]
    fn test_calculate_uses_end_when_stopped() {
        let now = Utc::now();
        let started = now - Duration::hours(10);
        let ended = started + Duration::minutes(65);
        let c = calculate_time_charge(&RateTable::default(), started, Some(ended), now).unwrap();
        assert_eq!(c.elapsed_minutes, 65);
        assert_eq!(c.total_charge_minor, 50_000);
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("started_at", "2026-10-16T09:30:00+09:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-10-16T00:30:00+00:00");

        assert!(parse_timestamp("started_at", "").is_err());
        assert!(parse_timestamp("started_at", "yesterday").is_err());
    }

    #[test]
    fn test_rate_table_validation() {
        assert!(RateTable::default().validate().is_ok());

        let inverted = RateTable {
            day_cap_minutes: 120,
            ..RateTable::default()
        };
        assert!(inverted.validate().is_err());

        let negative = RateTable {
            hourly_rate_minor: -1,
            ..RateTable::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_tier_tags() {
        assert_eq!(RateTier::Standard.as_tag(), "standard");
        assert_eq!(RateTier::ThreeHour.as_tag(), "3hour");
        assert_eq!(RateTier::DayCap.as_tag(), "5hour");
    }
}
