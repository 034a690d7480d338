//! # Memberships
//!
//! Plans, membership periods, usage audit rows and the included/overage
//! split shared by usage tracking and checkout quoting.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   purchase ──► ACTIVE ──── end_date passes, no auto-renew ──► EXPIRED  │
//! │                  │  │                                                   │
//! │                  │  └──── renew ──► old row EXPIRED                    │
//! │                  │                  new row ACTIVE (starts at old end)  │
//! │                  │                                                      │
//! │                  └─────── cancel ──► CANCELLED (terminal)               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Hour Accounting
//! `hours_used` starts at zero on purchase. A renewal with carry-over starts
//! it NEGATIVE by the carried credit, so `hours_included - hours_used` is the
//! remaining allowance in both cases.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Plans
// =============================================================================

/// A purchasable subscription tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MembershipPlan {
    pub id: String,
    pub name: String,
    pub description: Option<String>,

    /// Price per period in minor units.
    pub price_minor: i64,

    /// Seat hours included per period.
    pub hours_included: f64,

    /// Minor units per hour beyond the included hours.
    pub overage_rate_minor: i64,

    /// Bonus points granted on purchase and on every renewal.
    pub points_on_purchase: i64,

    /// Yen per point while this plan is active. Falls back to the
    /// member rate in settings when absent.
    pub earn_rate_denominator: Option<i64>,

    /// Soft-delete flag.
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl MembershipPlan {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_minor(self.price_minor)
    }

    #[inline]
    pub fn overage_rate(&self) -> Money {
        Money::from_minor(self.overage_rate_minor)
    }
}

// =============================================================================
// Membership Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipStatus {
    Active,
    Expired,
    /// Terminal. Set only by explicit cancellation.
    Cancelled,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "ACTIVE",
            MembershipStatus::Expired => "EXPIRED",
            MembershipStatus::Cancelled => "CANCELLED",
        }
    }
}

// =============================================================================
// Customer Membership
// =============================================================================

/// One subscription period owned by a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CustomerMembership {
    pub id: String,
    pub customer_id: String,
    pub plan_id: String,

    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,

    /// Exactly one calendar month after `start_date`.
    #[ts(as = "String")]
    pub end_date: DateTime<Utc>,

    /// Hours consumed this period. Negative while carried-over credit
    /// is still unspent.
    pub hours_used: f64,

    /// Credit brought forward from the previous period.
    pub carried_over_hours: f64,

    pub auto_renew: bool,
    pub status: MembershipStatus,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CustomerMembership {
    /// ACTIVE and not past its end date.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == MembershipStatus::Active && self.end_date >= now
    }

    /// Still marked ACTIVE but past its end date; the sweeper's input.
    pub fn is_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        self.status == MembershipStatus::Active && self.end_date < now
    }

    /// Included hours not yet consumed this period.
    pub fn remaining_included_hours(&self, plan: &MembershipPlan) -> f64 {
        (plan.hours_included - self.hours_used).max(0.0)
    }

    /// Credit to bring into the next period, capped at one allotment.
    pub fn carry_over_credit(&self, plan: &MembershipPlan) -> f64 {
        self.remaining_included_hours(plan).min(plan.hours_included.max(0.0))
    }

    /// Fails unless the membership is ACTIVE.
    pub fn ensure_active(&self) -> CoreResult<()> {
        if self.status != MembershipStatus::Active {
            return Err(CoreError::InvalidMembershipStatus {
                membership_id: self.id.clone(),
                status: self.status.as_str().to_string(),
            });
        }
        Ok(())
    }
}

/// End of a period starting at `start`: one calendar month later.
///
/// Month-end starts clamp to the last day of the next month
/// (Jan 31 → Feb 28/29).
pub fn period_end(start: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
    start
        .checked_add_months(Months::new(1))
        .ok_or(CoreError::PeriodOverflow(start))
}

// =============================================================================
// Usage
// =============================================================================

/// Immutable audit row for one hour-consumption event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MembershipUsage {
    pub id: String,
    pub membership_id: String,
    pub seat_session_id: Option<String>,
    pub hours_used: f64,
    pub overage_hours: f64,
    pub overage_charge_minor: i64,
    pub description: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// How a block of hours divides between the included allowance and overage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UsageSplit {
    pub included_hours_used: f64,
    pub overage_hours: f64,
    /// Rounded to the nearest ¥10.
    pub overage_charge_minor: i64,
    pub remaining_included_after: f64,
}

impl UsageSplit {
    #[inline]
    pub fn overage_charge(&self) -> Money {
        Money::from_minor(self.overage_charge_minor)
    }
}

/// Splits `hours_to_use` against what remains of the plan's allowance.
///
/// The only place the included/overage math lives; both the committing
/// path and the read-only quote call it.
///
/// ```rust
/// use meeple_core::membership::split_usage;
///
/// let split = split_usage(20.0, 30_000, 18.0, 5.0);
/// assert_eq!(split.included_hours_used, 2.0);
/// assert_eq!(split.overage_hours, 3.0);
/// assert_eq!(split.overage_charge_minor, 90_000);
/// ```
pub fn split_usage(
    hours_included: f64,
    overage_rate_minor: i64,
    hours_used_so_far: f64,
    hours_to_use: f64,
) -> UsageSplit {
    let remaining_included = (hours_included - hours_used_so_far).max(0.0);
    let included_hours_used = hours_to_use.min(remaining_included);
    let overage_hours = (hours_to_use - included_hours_used).max(0.0);
    let overage_charge = Money::round_to_ten_yen(overage_hours * overage_rate_minor as f64);

    UsageSplit {
        included_hours_used,
        overage_hours,
        overage_charge_minor: overage_charge.minor(),
        remaining_included_after: remaining_included - included_hours_used,
    }
}

/// [`split_usage`] against a concrete plan and membership.
pub fn split_for(plan: &MembershipPlan, membership: &CustomerMembership, hours_to_use: f64) -> UsageSplit {
    split_usage(
        plan.hours_included,
        plan.overage_rate_minor,
        membership.hours_used,
        hours_to_use,
    )
}

// =============================================================================
// Read Models
// =============================================================================

/// An active membership with its plan joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMembership {
    pub membership: CustomerMembership,
    pub plan: MembershipPlan,
}

/// Checkout quote for seat hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TimeChargeQuote {
    pub hours_used: f64,
    pub total_charge_minor: i64,
    pub included_hours_used: f64,
    pub overage_hours: f64,
    pub membership_id: Option<String>,
    pub plan_name: Option<String>,
    pub remaining_included_hours: Option<f64>,
}

impl TimeChargeQuote {
    /// Full hours at the regular rate; no membership context.
    pub fn regular(hours_used: f64, regular_hourly_rate: Money) -> Self {
        TimeChargeQuote {
            hours_used,
            total_charge_minor: regular_hourly_rate.for_hours(hours_used).minor(),
            included_hours_used: 0.0,
            overage_hours: hours_used,
            membership_id: None,
            plan_name: None,
            remaining_included_hours: None,
        }
    }

    /// Included hours are free; only the overage is charged.
    pub fn member(hours_used: f64, active: &ActiveMembership, split: &UsageSplit) -> Self {
        TimeChargeQuote {
            hours_used,
            total_charge_minor: split.overage_charge_minor,
            included_hours_used: split.included_hours_used,
            overage_hours: split.overage_hours,
            membership_id: Some(active.membership.id.clone()),
            plan_name: Some(active.plan.name.clone()),
            remaining_included_hours: Some(split.remaining_included_after),
        }
    }
}

/// Aggregate reporting figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MembershipStats {
    pub active_memberships: i64,
    /// Approximation: ACTIVE + EXPIRED rows times their plan price.
    pub total_revenue_minor: i64,
    pub average_hours_used: f64,
}

/// Outcome of comparing usage rows with a membership's accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UsageReconciliation {
    pub membership_id: String,
    pub usage_rows: i64,
    pub usage_sum: f64,
    /// `hours_used + carried_over_hours` on the membership row.
    pub expected_sum: f64,
}

/// Tolerance for summing fractional hours.
const HOURS_EPSILON: f64 = 1e-6;

impl UsageReconciliation {
    pub fn new(membership: &CustomerMembership, usages: &[MembershipUsage]) -> Self {
        UsageReconciliation {
            membership_id: membership.id.clone(),
            usage_rows: usages.len() as i64,
            usage_sum: usages.iter().map(|u| u.hours_used).sum(),
            expected_sum: membership.hours_used + membership.carried_over_hours,
        }
    }

    pub fn is_consistent(&self) -> bool {
        (self.usage_sum - self.expected_sum).abs() < HOURS_EPSILON
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan(hours_included: f64, overage_rate_minor: i64) -> MembershipPlan {
        let now = Utc::now();
        MembershipPlan {
            id: "plan".to_string(),
            name: "Regular".to_string(),
            description: None,
            price_minor: 500_000,
            hours_included,
            overage_rate_minor,
            points_on_purchase: 100,
            earn_rate_denominator: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn membership(hours_used: f64) -> CustomerMembership {
        let now = Utc::now();
        CustomerMembership {
            id: "m1".to_string(),
            customer_id: "c1".to_string(),
            plan_id: "plan".to_string(),
            start_date: now,
            end_date: now + chrono::Duration::days(30),
            hours_used,
            carried_over_hours: 0.0,
            auto_renew: false,
            status: MembershipStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_split_partial_overage() {
        let split = split_for(&plan(20.0, 30_000), &membership(18.0), 5.0);
        assert_eq!(split.included_hours_used, 2.0);
        assert_eq!(split.overage_hours, 3.0);
        assert_eq!(split.overage_charge_minor, 90_000);
        assert_eq!(split.remaining_included_after, 0.0);
    }

    #[test]
    fn test_split_within_allowance() {
        let split = split_for(&plan(20.0, 30_000), &membership(0.0), 2.0);
        assert_eq!(split.included_hours_used, 2.0);
        assert_eq!(split.overage_hours, 0.0);
        assert_eq!(split.overage_charge_minor, 0);
        assert_eq!(split.remaining_included_after, 18.0);
    }

    #[test]
    fn test_split_rounds_to_ten_yen() {
        // 1h over at ¥333.33/h = 33_333 minor → ¥330
        let split = split_usage(0.0, 33_333, 0.0, 1.0);
        assert_eq!(split.overage_charge_minor, 33_000);
        // 0.5h at ¥333.33/h = 16_666.5 minor → ¥170
        let split = split_usage(0.0, 33_333, 0.0, 0.5);
        assert_eq!(split.overage_charge_minor, 17_000);
    }

    #[test]
    fn test_split_uses_carried_credit() {
        // Carried 15h in: hours_used starts at -15
        let split = split_for(&plan(20.0, 30_000), &membership(-15.0), 30.0);
        assert_eq!(split.included_hours_used, 30.0);
        assert_eq!(split.remaining_included_after, 5.0);
    }

    #[test]
    fn test_carry_over_capped_at_one_allotment() {
        let p = plan(20.0, 30_000);
        assert_eq!(membership(5.0).carry_over_credit(&p), 15.0);
        // A period that itself started with 15h of credit and used none
        assert_eq!(membership(-15.0).carry_over_credit(&p), 20.0);
        assert_eq!(membership(25.0).carry_over_credit(&p), 0.0);
    }

    #[test]
    fn test_period_end_is_one_calendar_month() {
        let start = Utc.with_ymd_and_hms(2026, 1, 31, 10, 0, 0).unwrap();
        let end = period_end(start).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 2, 28, 10, 0, 0).unwrap());

        let start = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
        assert_eq!(
            period_end(start).unwrap(),
            Utc.with_ymd_and_hms(2026, 11, 16, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_active_and_lapsed() {
        let now = Utc::now();
        let mut m = membership(0.0);
        assert!(m.is_active_at(now));
        assert!(!m.is_lapsed_at(now));

        m.end_date = now - chrono::Duration::seconds(1);
        assert!(!m.is_active_at(now));
        assert!(m.is_lapsed_at(now));

        m.status = MembershipStatus::Cancelled;
        assert!(!m.is_lapsed_at(now));
        assert!(m.ensure_active().is_err());
    }

    #[test]
    fn test_quotes() {
        let regular = TimeChargeQuote::regular(2.0, Money::from_minor(50_000));
        assert_eq!(regular.total_charge_minor, 100_000);
        assert!(regular.membership_id.is_none());

        let active = ActiveMembership {
            membership: membership(0.0),
            plan: plan(20.0, 30_000),
        };
        let split = split_for(&active.plan, &active.membership, 2.0);
        let quote = TimeChargeQuote::member(2.0, &active, &split);
        assert_eq!(quote.total_charge_minor, 0);
        assert_eq!(quote.remaining_included_hours, Some(18.0));
        assert_eq!(quote.plan_name.as_deref(), Some("Regular"));
    }

    #[test]
    fn test_usage_reconciliation() {
        let mut m = membership(-10.0);
        m.carried_over_hours = 15.0;
        let usage = MembershipUsage {
            id: "u1".to_string(),
            membership_id: m.id.clone(),
            seat_session_id: None,
            hours_used: 5.0,
            overage_hours: 0.0,
            overage_charge_minor: 0,
            description: None,
            created_at: Utc::now(),
        };
        let report = UsageReconciliation::new(&m, &[usage]);
        assert!(report.is_consistent());
    }
}
