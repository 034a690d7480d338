//! # Points Ledger Service
//!
//! Append-only points ledger with a cached balance on the customer row.
//!
//! ## Posting a Ledger Entry
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  LedgerOp::validate()              ← reject bad input before any I/O   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │  CustomerRepository::lock()        ← write lock, then read balance     │
//! │  LedgerOp::apply(balance)          ← redeem rejects, refund/adjust clamp│
//! │  PointsRepository::insert()        ← ledger row with balance_after     │
//! │  CustomerRepository::set_balance() ← cached balance                    │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The balance is never cached in memory between calls; every posting
//! re-reads it under the lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use meeple_core::points::{self, LedgerOp};
use meeple_core::validation::{validate_description, validate_history_limit, validate_rate};
use meeple_core::{LedgerReconciliation, PointsSettings, PointsTransaction};
use meeple_db::{CustomerRepository, Database, PointsRepository};

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};

/// A posted entry and whether the requested delta was cut short at zero.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PostedEntry {
    pub transaction: PointsTransaction,
    pub clamped: bool,
}

/// Outcome of a redemption.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub transaction: PointsTransaction,
    /// Yen value of the redeemed points.
    pub value_yen: i64,
}

/// Points ledger operations.
#[derive(Debug, Clone)]
pub struct PointsLedgerService {
    db: Arc<Database>,
    config: Arc<ServiceConfig>,
}

impl PointsLedgerService {
    pub fn new(db: Arc<Database>, config: Arc<ServiceConfig>) -> Self {
        PointsLedgerService { db, config }
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// The settings row, created from the configured defaults on first use.
    pub async fn get_settings(&self) -> ServiceResult<PointsSettings> {
        let defaults = self.config.points_defaults(Utc::now());
        Ok(self.db.settings().get_or_create(&defaults).await?)
    }

    /// Updates both earn rates.
    pub async fn update_settings(
        &self,
        regular_earn_rate: i64,
        member_earn_rate: i64,
    ) -> ServiceResult<PointsSettings> {
        validate_rate("regular_earn_rate", regular_earn_rate)?;
        validate_rate("member_earn_rate", member_earn_rate)?;

        let now = Utc::now();
        let settings = self
            .db
            .settings()
            .update_rates(&self.config.points_defaults(now), regular_earn_rate, member_earn_rate, now)
            .await?;

        info!(regular_earn_rate, member_earn_rate, "Points settings updated");
        Ok(settings)
    }

    // =========================================================================
    // Earn Math
    // =========================================================================

    /// True iff the customer holds an ACTIVE membership that has not ended.
    pub async fn has_active_membership(&self, customer_id: &str) -> ServiceResult<bool> {
        Ok(self.active_plan_rate(customer_id).await?.is_some())
    }

    /// Points a payment of `amount_minor` earns.
    ///
    /// Without a customer, or without an active membership, the regular rate
    /// applies. An active plan with its own earn rate overrides the member
    /// rate.
    pub async fn calculate_points_earned(
        &self,
        amount_minor: i64,
        customer_id: Option<&str>,
    ) -> ServiceResult<i64> {
        if amount_minor < 0 {
            return Err(ServiceError::Validation("amount must not be negative".into()));
        }

        let settings = self.get_settings().await?;
        let earn_rate = match customer_id {
            Some(id) => match self.active_plan_rate(id).await? {
                Some(plan_rate) => settings.earn_rate_for(true, plan_rate),
                None => settings.earn_rate_for(false, None),
            },
            None => settings.earn_rate_for(false, None),
        };

        Ok(points::calculate_points_earned(amount_minor, earn_rate)?)
    }

    /// `Some(plan earn rate)` when an active membership exists.
    async fn active_plan_rate(&self, customer_id: &str) -> ServiceResult<Option<Option<i64>>> {
        let now = Utc::now();
        let active = self
            .db
            .memberships()
            .active_for_customer(customer_id)
            .await?
            .into_iter()
            .find(|m| m.is_active_at(now));

        let Some(membership) = active else {
            return Ok(None);
        };

        let plan_rate = self
            .db
            .plans()
            .get_by_id(&membership.plan_id)
            .await?
            .and_then(|plan| plan.earn_rate_denominator);

        Ok(Some(plan_rate))
    }

    // =========================================================================
    // Postings
    // =========================================================================

    /// Adds points for a paid order.
    pub async fn award_points(
        &self,
        customer_id: &str,
        points: i64,
        order_id: Option<&str>,
        description: Option<&str>,
    ) -> ServiceResult<PointsTransaction> {
        let posted = self
            .post(customer_id, LedgerOp::Earn(points), order_id, description)
            .await?;
        Ok(posted.transaction)
    }

    /// Spends points. Rejected with `InsufficientPoints` if the balance is
    /// short; nothing is written in that case.
    pub async fn redeem_points(
        &self,
        customer_id: &str,
        points_to_redeem: i64,
        order_id: Option<&str>,
        description: Option<&str>,
    ) -> ServiceResult<Redemption> {
        let settings = self.get_settings().await?;
        let posted = self
            .post(customer_id, LedgerOp::Redeem(points_to_redeem), order_id, description)
            .await?;

        Ok(Redemption {
            transaction: posted.transaction,
            value_yen: settings.redemption_value(points_to_redeem).yen(),
        })
    }

    /// Claws back points earned on a reversed order.
    ///
    /// Deducts at most the current balance; `clamped` reports a shortfall.
    pub async fn refund_points(
        &self,
        customer_id: &str,
        points_earned: i64,
        order_id: Option<&str>,
        description: Option<&str>,
    ) -> ServiceResult<PostedEntry> {
        self.post(customer_id, LedgerOp::Refund(points_earned), order_id, description)
            .await
    }

    pub async fn add_bonus_points(
        &self,
        customer_id: &str,
        bonus_amount: i64,
        description: &str,
    ) -> ServiceResult<PointsTransaction> {
        let posted = self
            .post(customer_id, LedgerOp::Bonus(bonus_amount), None, Some(description))
            .await?;
        Ok(posted.transaction)
    }

    /// Signed staff correction. The resulting balance floors at zero.
    pub async fn adjust_points(
        &self,
        customer_id: &str,
        adjustment_amount: i64,
        reason: &str,
    ) -> ServiceResult<PostedEntry> {
        if reason.trim().is_empty() {
            return Err(ServiceError::Validation("reason is required".into()));
        }

        self.post(customer_id, LedgerOp::Adjust(adjustment_amount), None, Some(reason))
            .await
    }

    async fn post(
        &self,
        customer_id: &str,
        op: LedgerOp,
        order_id: Option<&str>,
        description: Option<&str>,
    ) -> ServiceResult<PostedEntry> {
        op.validate()?;
        if let Some(text) = description {
            validate_description("description", text)?;
        }

        let mut tx = self.db.begin().await?;
        let posted = Self::post_in(&mut tx, customer_id, op, order_id, description, Utc::now()).await?;
        tx.commit().await?;

        Ok(posted)
    }

    /// Posts `op` on the caller's transaction.
    ///
    /// Locks the customer row first, so the balance read here is the one
    /// the new row is computed from.
    pub(crate) async fn post_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
        op: LedgerOp,
        order_id: Option<&str>,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServiceResult<PostedEntry> {
        let customer = CustomerRepository::lock(&mut *conn, customer_id, now).await?;
        let posting = op.apply(customer.points_balance)?;

        if posting.clamped {
            warn!(
                customer_id = %customer_id,
                kind = op.kind().as_str(),
                requested = ?op,
                applied = posting.amount,
                balance_before = customer.points_balance,
                "Points deduction clamped at zero balance"
            );
        }

        let transaction = PointsTransaction {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            order_id: order_id.map(str::to_string),
            transaction_type: op.kind(),
            amount: posting.amount,
            balance_after: posting.balance_after,
            description: description.map(str::to_string),
            created_at: now,
        };

        PointsRepository::insert(&mut *conn, &transaction).await?;
        CustomerRepository::set_balance(&mut *conn, customer_id, posting.balance_after, now).await?;

        Ok(PostedEntry {
            transaction,
            clamped: posting.clamped,
        })
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Newest first, `limit` defaulting to 50.
    pub async fn get_points_history(
        &self,
        customer_id: &str,
        limit: Option<u32>,
    ) -> ServiceResult<Vec<PointsTransaction>> {
        let limit = validate_history_limit(limit)?;
        Ok(self.db.points().history(customer_id, limit).await?)
    }

    /// Outstanding points across every customer.
    pub async fn get_total_points_liability(&self) -> ServiceResult<i64> {
        Ok(self.db.customers().total_points_balance().await?)
    }

    /// Replays a customer's ledger against the cached balance. Read-only.
    pub async fn reconcile_ledger(&self, customer_id: &str) -> ServiceResult<LedgerReconciliation> {
        let mut tx = self.db.begin().await?;

        let customer = CustomerRepository::get_in(&mut tx, customer_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", customer_id))?;
        let ledger = PointsRepository::ledger_in(&mut tx, customer_id).await?;

        tx.rollback().await?;

        let report = points::reconcile_ledger(customer_id, &ledger, customer.points_balance);
        if !report.is_consistent() {
            warn!(
                customer_id = %customer_id,
                ledger_sum = report.ledger_sum,
                cached_balance = report.cached_balance,
                "Points ledger does not reconcile"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meeple_core::PointsTransactionType;
    use meeple_db::DbConfig;

    async fn setup() -> (PointsLedgerService, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let customer = db.customers().create("Aiko Sato", None).await.unwrap();
        let service = PointsLedgerService::new(Arc::new(db), Arc::new(ServiceConfig::default()));
        (service, customer.id)
    }

    #[tokio::test]
    async fn test_settings_created_lazily() {
        let (ledger, _) = setup().await;
        let settings = ledger.get_settings().await.unwrap();
        assert_eq!(
            (settings.regular_earn_rate, settings.member_earn_rate, settings.points_per_yen),
            (50, 40, 1)
        );

        let updated = ledger.update_settings(100, 80).await.unwrap();
        assert_eq!(updated.regular_earn_rate, 100);
        assert!(ledger.update_settings(0, 80).await.is_err());
    }

    #[tokio::test]
    async fn test_award_then_redeem() {
        let (ledger, customer_id) = setup().await;

        let earned = ledger
            .award_points(&customer_id, 100, Some("order-1"), None)
            .await
            .unwrap();
        assert_eq!(earned.balance_after, 100);
        assert_eq!(earned.transaction_type, PointsTransactionType::Earned);

        let redemption = ledger.redeem_points(&customer_id, 40, None, None).await.unwrap();
        assert_eq!(redemption.transaction.amount, -40);
        assert_eq!(redemption.transaction.balance_after, 60);
        assert_eq!(redemption.value_yen, 40);
    }

    #[tokio::test]
    async fn test_redeem_more_than_balance_rejected() {
        let (ledger, customer_id) = setup().await;
        ledger.award_points(&customer_id, 50, None, None).await.unwrap();

        let err = ledger.redeem_points(&customer_id, 51, None, None).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientPoints {
                requested: 51,
                available: 50
            }
        ));

        let history = ledger.get_points_history(&customer_id, None).await.unwrap();
        assert_eq!(history.len(), 1);
        let report = ledger.reconcile_ledger(&customer_id).await.unwrap();
        assert_eq!(report.cached_balance, 50);
    }

    #[tokio::test]
    async fn test_refund_clamps() {
        let (ledger, customer_id) = setup().await;
        ledger.award_points(&customer_id, 30, None, None).await.unwrap();

        let refund = ledger.refund_points(&customer_id, 100, Some("order-9"), None).await.unwrap();
        assert!(refund.clamped);
        assert_eq!(refund.transaction.amount, -30);
        assert_eq!(refund.transaction.balance_after, 0);
    }

    #[tokio::test]
    async fn test_adjust_floors_at_zero() {
        let (ledger, customer_id) = setup().await;
        ledger.add_bonus_points(&customer_id, 20, "Welcome").await.unwrap();

        let up = ledger.adjust_points(&customer_id, 5, "Goodwill").await.unwrap();
        assert!(!up.clamped);
        assert_eq!(up.transaction.balance_after, 25);

        let down = ledger.adjust_points(&customer_id, -1_000, "Correction").await.unwrap();
        assert!(down.clamped);
        assert_eq!(down.transaction.balance_after, 0);
        assert_eq!(down.transaction.amount, -25);

        assert!(ledger.adjust_points(&customer_id, 0, "Nothing").await.is_err());
        assert!(ledger.adjust_points(&customer_id, 5, "  ").await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_customer() {
        let (ledger, _) = setup().await;
        let err = ledger.award_points("missing", 10, None, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
        assert!(matches!(
            ledger.reconcile_ledger("missing").await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_regular_earn_rate_without_membership() {
        let (ledger, customer_id) = setup().await;
        assert!(!ledger.has_active_membership(&customer_id).await.unwrap());
        assert_eq!(
            ledger
                .calculate_points_earned(500_000, Some(&customer_id))
                .await
                .unwrap(),
            100
        );
        assert_eq!(ledger.calculate_points_earned(500_000, None).await.unwrap(), 100);
        assert!(ledger.calculate_points_earned(-1, None).await.is_err());
    }

    #[tokio::test]
    async fn test_history_and_liability() {
        let (ledger, customer_id) = setup().await;
        for points in [10, 20, 30] {
            ledger.award_points(&customer_id, points, None, None).await.unwrap();
        }

        let history = ledger.get_points_history(&customer_id, Some(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, 30);
        assert!(ledger.get_points_history(&customer_id, Some(0)).await.is_err());

        assert_eq!(ledger.get_total_points_liability().await.unwrap(), 60);

        let report = ledger.reconcile_ledger(&customer_id).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.transaction_count, 3);
    }
}
