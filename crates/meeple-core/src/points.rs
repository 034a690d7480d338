//! # Loyalty Points
//!
//! Ledger entry kinds, earn-rate math and balance postings.
//!
//! ## Ledger Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  points_transactions (append-only)          customers.points_balance   │
//! │  ┌──────────┬────────┬───────────────┐      ┌─────────────────────┐    │
//! │  │ kind     │ amount │ balance_after │      │  cached running sum │    │
//! │  ├──────────┼────────┼───────────────┤      │                     │    │
//! │  │ EARNED   │   +100 │           100 │      │                     │    │
//! │  │ REDEEMED │    -30 │            70 │ ───► │         70          │    │
//! │  └──────────┴────────┴───────────────┘      └─────────────────────┘    │
//! │                                                                         │
//! │  A posting is computed from the balance read INSIDE the transaction     │
//! │  and written together with the new cached balance.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::POINTS_SETTINGS_ID;

// =============================================================================
// Settings
// =============================================================================

/// Singleton earn/redeem configuration (`id = 'default'`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PointsSettings {
    pub id: String,

    /// Yen spent per point for customers without a membership.
    pub regular_earn_rate: i64,

    /// Yen spent per point while a membership is active.
    pub member_earn_rate: i64,

    /// Yen value of one point on redemption.
    pub points_per_yen: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl PointsSettings {
    /// Settings row with the given rates, stamped `now`.
    pub fn new(regular_earn_rate: i64, member_earn_rate: i64, points_per_yen: i64, now: DateTime<Utc>) -> Self {
        PointsSettings {
            id: POINTS_SETTINGS_ID.to_string(),
            regular_earn_rate,
            member_earn_rate,
            points_per_yen,
            created_at: now,
            updated_at: now,
        }
    }

    /// Picks the earn rate for a customer.
    ///
    /// `plan_rate` is the active plan's own denominator, if it has one.
    pub fn earn_rate_for(&self, has_active_membership: bool, plan_rate: Option<i64>) -> i64 {
        if !has_active_membership {
            return self.regular_earn_rate;
        }
        plan_rate.filter(|r| *r > 0).unwrap_or(self.member_earn_rate)
    }

    /// Yen value of `points` on redemption.
    pub fn redemption_value(&self, points: i64) -> Money {
        Money::from_yen(points * self.points_per_yen)
    }
}

// =============================================================================
// Transaction Kind
// =============================================================================

/// The kind of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointsTransactionType {
    /// Earned on a paid order.
    Earned,
    /// Spent against an order.
    Redeemed,
    /// Clawed back after an order reversal.
    Refunded,
    /// Granted by a membership purchase or renewal.
    Bonus,
    /// Signed correction entered by staff.
    ManualAdjustment,
}

impl PointsTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointsTransactionType::Earned => "EARNED",
            PointsTransactionType::Redeemed => "REDEEMED",
            PointsTransactionType::Refunded => "REFUNDED",
            PointsTransactionType::Bonus => "BONUS",
            PointsTransactionType::ManualAdjustment => "MANUAL_ADJUSTMENT",
        }
    }
}

/// One row of the append-only ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PointsTransaction {
    pub id: String,
    pub customer_id: String,
    pub order_id: Option<String>,
    pub transaction_type: PointsTransactionType,

    /// Signed delta; negative for redemptions and clawbacks.
    pub amount: i64,

    /// Balance immediately after this entry.
    pub balance_after: i64,

    pub description: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Earn Math
// =============================================================================

/// Points earned for a payment.
///
/// Minor units are truncated to whole yen, then divided by `earn_rate`
/// (also truncating).
///
/// ```rust
/// use meeple_core::points::calculate_points_earned;
///
/// assert_eq!(calculate_points_earned(500_000, 50).unwrap(), 100);
/// assert_eq!(calculate_points_earned(500_000, 40).unwrap(), 125);
/// assert_eq!(calculate_points_earned(4_999, 50).unwrap(), 0);
/// ```
pub fn calculate_points_earned(amount_minor: i64, earn_rate: i64) -> CoreResult<i64> {
    if amount_minor < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "amount".to_string(),
        }
        .into());
    }

    if earn_rate <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "earn_rate".to_string(),
        }
        .into());
    }

    Ok(Money::from_minor(amount_minor).yen() / earn_rate)
}

// =============================================================================
// Ledger Operations
// =============================================================================

/// A balance-changing request, validated and applied against the balance
/// read inside the enclosing transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    /// Add points for a paid order.
    Earn(i64),
    /// Spend points; rejected if the balance is short.
    Redeem(i64),
    /// Claw back previously earned points; clamps at zero.
    Refund(i64),
    /// Membership bonus.
    Bonus(i64),
    /// Signed staff correction; clamps at zero.
    Adjust(i64),
}

/// The outcome of applying a [`LedgerOp`] to a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPosting {
    /// Delta actually written to the ledger.
    pub amount: i64,
    pub balance_after: i64,
    /// The requested delta was cut short to keep the balance at zero.
    pub clamped: bool,
}

impl LedgerOp {
    pub fn kind(&self) -> PointsTransactionType {
        match self {
            LedgerOp::Earn(_) => PointsTransactionType::Earned,
            LedgerOp::Redeem(_) => PointsTransactionType::Redeemed,
            LedgerOp::Refund(_) => PointsTransactionType::Refunded,
            LedgerOp::Bonus(_) => PointsTransactionType::Bonus,
            LedgerOp::Adjust(_) => PointsTransactionType::ManualAdjustment,
        }
    }

    /// Rejects malformed requests before anything is read or written.
    pub fn validate(&self) -> CoreResult<()> {
        let (field, value) = match *self {
            LedgerOp::Earn(v) => ("points", v),
            LedgerOp::Redeem(v) => ("points_to_redeem", v),
            LedgerOp::Refund(v) => ("points_earned", v),
            LedgerOp::Bonus(v) => ("bonus_amount", v),
            LedgerOp::Adjust(v) => {
                if v == 0 {
                    return Err(ValidationError::MustNotBeZero {
                        field: "adjustment_amount".to_string(),
                    }
                    .into());
                }
                return Ok(());
            }
        };

        if value <= 0 {
            return Err(ValidationError::MustBePositive {
                field: field.to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Computes the posting for `balance`.
    pub fn apply(&self, balance: i64) -> CoreResult<LedgerPosting> {
        self.validate()?;

        let posting = match *self {
            LedgerOp::Earn(points) | LedgerOp::Bonus(points) => LedgerPosting {
                amount: points,
                balance_after: checked_balance(balance, points)?,
                clamped: false,
            },
            LedgerOp::Redeem(points) => {
                if points > balance {
                    return Err(CoreError::InsufficientPoints {
                        requested: points,
                        available: balance,
                    });
                }
                LedgerPosting {
                    amount: -points,
                    balance_after: balance - points,
                    clamped: false,
                }
            }
            LedgerOp::Refund(points) => {
                let deducted = points.min(balance.max(0));
                LedgerPosting {
                    amount: -deducted,
                    balance_after: balance - deducted,
                    clamped: deducted < points,
                }
            }
            LedgerOp::Adjust(delta) => {
                let raw = checked_balance(balance, delta)?;
                let balance_after = raw.max(0);
                LedgerPosting {
                    amount: balance_after - balance,
                    balance_after,
                    clamped: raw < 0,
                }
            }
        };

        Ok(posting)
    }
}

fn checked_balance(balance: i64, delta: i64) -> CoreResult<i64> {
    balance.checked_add(delta).ok_or_else(|| {
        ValidationError::Overflow {
            field: "points_balance".to_string(),
        }
        .into()
    })
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Result of replaying a customer's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReconciliation {
    pub customer_id: String,
    pub transaction_count: i64,
    /// Sum of every `amount`.
    pub ledger_sum: i64,
    /// Cached balance on the customer row.
    pub cached_balance: i64,
    /// Ids of rows whose `balance_after` disagrees with the running sum.
    pub mismatched_rows: Vec<String>,
}

impl LedgerReconciliation {
    pub fn is_consistent(&self) -> bool {
        self.mismatched_rows.is_empty() && self.ledger_sum == self.cached_balance
    }
}

/// Replays `transactions` (oldest first) against `cached_balance`.
pub fn reconcile_ledger(
    customer_id: &str,
    transactions: &[PointsTransaction],
    cached_balance: i64,
) -> LedgerReconciliation {
    let mut running = 0;
    let mut mismatched_rows = Vec::new();

    for tx in transactions {
        running += tx.amount;
        if tx.balance_after != running {
            mismatched_rows.push(tx.id.clone());
        }
    }

    LedgerReconciliation {
        customer_id: customer_id.to_string(),
        transaction_count: transactions.len() as i64,
        ledger_sum: running,
        cached_balance,
        mismatched_rows,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
