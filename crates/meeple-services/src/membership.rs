//! # Membership Service
//!
//! Subscription lifecycle, hour tracking and checkout quotes.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   purchase ──► ACTIVE ──── cancel ────► CANCELLED (terminal)            │
//! │                  │                                                      │
//! │                  ├── end_date passed, no auto-renew ──► EXPIRED         │
//! │                  │                                                      │
//! │                  └── renew ──► EXPIRED (old row)                        │
//! │                               + ACTIVE (new row, optional carry-over)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Hours
//! `track_hour_usage` commits usage; `calculate_time_charges` only quotes.
//! Both split hours with [`meeple_core::membership::split_for`].
//!
//! A carried-over renewal starts with `hours_used = -credit` and records
//! the credit in `carried_over_hours`, so the new period's allowance is
//! the plan's hours plus the credit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use meeple_core::membership::{period_end, split_for};
use meeple_core::points::LedgerOp;
use meeple_core::validation::{
    validate_amount_minor, validate_description, validate_hours, validate_name, validate_rate,
};
use meeple_core::{
    ActiveMembership, CustomerMembership, MembershipPlan, MembershipStats, MembershipStatus,
    MembershipUsage, Money, TimeChargeQuote, UsageReconciliation,
};
use meeple_db::{CustomerRepository, Database, MembershipRepository, PlanRepository};

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::PointsLedgerService;

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// Fields for a new plan.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    pub name: String,
    pub description: Option<String>,
    pub price_minor: i64,
    pub hours_included: f64,
    pub overage_rate_minor: i64,
    #[serde(default)]
    pub points_on_purchase: i64,
    pub earn_rate_denominator: Option<i64>,
}

/// A committed usage row and what is left of the allowance.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RecordedUsage {
    pub usage: MembershipUsage,
    pub included_hours_used: f64,
    pub remaining_included_hours: f64,
}

// =============================================================================
// Service
// =============================================================================

/// Membership operations.
#[derive(Debug, Clone)]
pub struct MembershipService {
    db: Arc<Database>,
    config: Arc<ServiceConfig>,
}

impl MembershipService {
    pub fn new(db: Arc<Database>, config: Arc<ServiceConfig>) -> Self {
        MembershipService { db, config }
    }

    // =========================================================================
    // Plans
    // =========================================================================

    /// Active plans, cheapest first.
    pub async fn get_plans(&self) -> ServiceResult<Vec<MembershipPlan>> {
        Ok(self.db.plans().list_active().await?)
    }

    /// A plan by ID, active or not.
    pub async fn get_plan(&self, plan_id: &str) -> ServiceResult<MembershipPlan> {
        self.db
            .plans()
            .get_by_id(plan_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("MembershipPlan", plan_id))
    }

    pub async fn create_plan(&self, new_plan: NewPlan) -> ServiceResult<MembershipPlan> {
        validate_name("name", &new_plan.name)?;
        if let Some(text) = &new_plan.description {
            validate_description("description", text)?;
        }
        validate_amount_minor("price_minor", new_plan.price_minor)?;
        validate_hours("hours_included", new_plan.hours_included)?;
        validate_amount_minor("overage_rate_minor", new_plan.overage_rate_minor)?;
        validate_amount_minor("points_on_purchase", new_plan.points_on_purchase)?;
        if let Some(rate) = new_plan.earn_rate_denominator {
            validate_rate("earn_rate_denominator", rate)?;
        }

        let now = Utc::now();
        let plan = MembershipPlan {
            id: Uuid::new_v4().to_string(),
            name: new_plan.name.trim().to_string(),
            description: new_plan.description,
            price_minor: new_plan.price_minor,
            hours_included: new_plan.hours_included,
            overage_rate_minor: new_plan.overage_rate_minor,
            points_on_purchase: new_plan.points_on_purchase,
            earn_rate_denominator: new_plan.earn_rate_denominator,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.db.plans().insert(&plan).await?;
        info!(plan_id = %plan.id, name = %plan.name, "Membership plan created");
        Ok(plan)
    }

    /// Soft-deletes a plan. Existing memberships keep resolving it.
    pub async fn deactivate_plan(&self, plan_id: &str) -> ServiceResult<()> {
        self.db.plans().deactivate(plan_id, Utc::now()).await?;
        info!(plan_id = %plan_id, "Membership plan deactivated");
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// The customer's ACTIVE, unexpired membership with its plan.
    pub async fn get_active_membership(&self, customer_id: &str) -> ServiceResult<Option<ActiveMembership>> {
        let now = Utc::now();
        let membership = self
            .db
            .memberships()
            .active_for_customer(customer_id)
            .await?
            .into_iter()
            .find(|m| m.is_active_at(now));

        let Some(membership) = membership else {
            return Ok(None);
        };

        let plan = self.get_plan(&membership.plan_id).await?;
        Ok(Some(ActiveMembership { membership, plan }))
    }

    // =========================================================================
    // Purchase
    // =========================================================================

    /// Starts a one-month membership and awards the plan's bonus, in one
    /// transaction.
    ///
    /// ## Errors
    /// * `NotFound` - no such plan or customer
    /// * `InvalidState` - the plan is deactivated
    /// * `Conflict` - the customer already holds an active membership
    pub async fn purchase_membership(
        &self,
        customer_id: &str,
        plan_id: &str,
        auto_renew: bool,
    ) -> ServiceResult<CustomerMembership> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        CustomerRepository::lock(&mut tx, customer_id, now).await?;

        let plan = PlanRepository::get_in(&mut tx, plan_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("MembershipPlan", plan_id))?;
        if !plan.is_active {
            return Err(ServiceError::invalid_state(format!(
                "Plan {} is no longer offered",
                plan.name
            )));
        }

        for existing in MembershipRepository::active_for_customer_in(&mut tx, customer_id).await? {
            if existing.is_active_at(now) {
                return Err(ServiceError::conflict(format!(
                    "Customer {} already has an active membership",
                    customer_id
                )));
            }
            // Lapsed but not yet swept: the new purchase supersedes it.
            debug!(membership_id = %existing.id, "Expiring lapsed membership on purchase");
            MembershipRepository::set_status(
                &mut tx,
                &existing.id,
                MembershipStatus::Expired,
                existing.auto_renew,
                now,
            )
            .await?;
        }

        let membership = CustomerMembership {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            plan_id: plan.id.clone(),
            start_date: now,
            end_date: period_end(now)?,
            hours_used: 0.0,
            carried_over_hours: 0.0,
            auto_renew,
            status: MembershipStatus::Active,
            created_at: now,
            updated_at: now,
        };
        MembershipRepository::insert(&mut tx, &membership).await?;

        if plan.points_on_purchase > 0 {
            let description = format!("Membership purchase bonus: {}", plan.name);
            PointsLedgerService::post_in(
                &mut tx,
                customer_id,
                LedgerOp::Bonus(plan.points_on_purchase),
                None,
                Some(&description),
                now,
            )
            .await?;
        }

        tx.commit().await?;

        info!(
            membership_id = %membership.id,
            customer_id = %customer_id,
            plan = %plan.name,
            end_date = %membership.end_date,
            "Membership purchased"
        );
        Ok(membership)
    }

    // =========================================================================
    // Hours
    // =========================================================================

    /// Commits `hours_to_use` against a membership.
    ///
    /// ## Errors
    /// * `NotFound` - no such membership
    /// * `InvalidState` - the membership is not ACTIVE
    pub async fn track_hour_usage(
        &self,
        membership_id: &str,
        hours_to_use: f64,
        seat_session_id: Option<&str>,
        description: Option<&str>,
    ) -> ServiceResult<RecordedUsage> {
        validate_hours("hours_to_use", hours_to_use)?;
        if let Some(text) = description {
            validate_description("description", text)?;
        }

        let mut tx = self.db.begin().await?;
        let recorded = Self::track_hour_usage_in(
            &mut tx,
            membership_id,
            hours_to_use,
            seat_session_id,
            description,
            Utc::now(),
        )
        .await?;
        tx.commit().await?;

        Ok(recorded)
    }

    /// [`track_hour_usage`](Self::track_hour_usage) on the caller's transaction.
    pub(crate) async fn track_hour_usage_in(
        conn: &mut SqliteConnection,
        membership_id: &str,
        hours_to_use: f64,
        seat_session_id: Option<&str>,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServiceResult<RecordedUsage> {
        let membership = MembershipRepository::lock(&mut *conn, membership_id, now).await?;
        membership.ensure_active()?;

        let plan = PlanRepository::get_in(&mut *conn, &membership.plan_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("MembershipPlan", &membership.plan_id))?;

        let split = split_for(&plan, &membership, hours_to_use);

        let usage = MembershipUsage {
            id: Uuid::new_v4().to_string(),
            membership_id: membership_id.to_string(),
            seat_session_id: seat_session_id.map(str::to_string),
            hours_used: hours_to_use,
            overage_hours: split.overage_hours,
            overage_charge_minor: split.overage_charge_minor,
            description: description.map(str::to_string),
            created_at: now,
        };

        MembershipRepository::add_hours(&mut *conn, membership_id, hours_to_use, now).await?;
        MembershipRepository::insert_usage(&mut *conn, &usage).await?;

        debug!(
            membership_id = %membership_id,
            hours = hours_to_use,
            overage_hours = split.overage_hours,
            overage_charge_minor = split.overage_charge_minor,
            "Hour usage recorded"
        );

        Ok(RecordedUsage {
            usage,
            included_hours_used: split.included_hours_used,
            remaining_included_hours: split.remaining_included_after,
        })
    }

    /// Checkout quote for `hours_used`. Never writes.
    ///
    /// `regular_hourly_rate_minor` defaults to the configured checkout rate.
    pub async fn calculate_time_charges(
        &self,
        customer_id: Option<&str>,
        hours_used: f64,
        regular_hourly_rate_minor: Option<i64>,
    ) -> ServiceResult<TimeChargeQuote> {
        validate_hours("hours_used", hours_used)?;
        let rate = regular_hourly_rate_minor.unwrap_or(self.config.checkout.regular_hourly_rate_minor);
        validate_amount_minor("regular_hourly_rate_minor", rate)?;

        let active = match customer_id {
            Some(id) => self.get_active_membership(id).await?,
            None => None,
        };

        let quote = match active {
            Some(active) => {
                let split = split_for(&active.plan, &active.membership, hours_used);
                TimeChargeQuote::member(hours_used, &active, &split)
            }
            None => TimeChargeQuote::regular(hours_used, Money::from_minor(rate)),
        };

        Ok(quote)
    }

    // =========================================================================
    // Renewal / Cancellation / Expiry
    // =========================================================================

    /// Closes the current period and opens the next, in one transaction.
    ///
    /// The new period starts at the old `end_date`. With
    /// `carry_over_unused_hours`, unused included hours (at most one plan
    /// allotment) are credited to the new period.
    ///
    /// ## Errors
    /// * `NotFound` - no such membership or plan
    /// * `InvalidState` - the membership was cancelled
    /// * `Conflict` - the customer holds another active membership
    pub async fn renew_membership(
        &self,
        membership_id: &str,
        carry_over_unused_hours: bool,
    ) -> ServiceResult<CustomerMembership> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let current = MembershipRepository::lock(&mut tx, membership_id, now).await?;
        if current.status == MembershipStatus::Cancelled {
            return Err(ServiceError::invalid_state(format!(
                "Membership {} was cancelled",
                membership_id
            )));
        }

        CustomerRepository::lock(&mut tx, &current.customer_id, now).await?;

        let others = MembershipRepository::active_for_customer_in(&mut tx, &current.customer_id).await?;
        if others.iter().any(|m| m.id != current.id && m.is_active_at(now)) {
            return Err(ServiceError::conflict(format!(
                "Customer {} already has another active membership",
                current.customer_id
            )));
        }

        let plan = PlanRepository::get_in(&mut tx, &current.plan_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("MembershipPlan", &current.plan_id))?;

        let credit = if carry_over_unused_hours {
            current.carry_over_credit(&plan)
        } else {
            0.0
        };

        MembershipRepository::set_status(
            &mut tx,
            &current.id,
            MembershipStatus::Expired,
            current.auto_renew,
            now,
        )
        .await?;

        let start_date = current.end_date;
        let renewed = CustomerMembership {
            id: Uuid::new_v4().to_string(),
            customer_id: current.customer_id.clone(),
            plan_id: plan.id.clone(),
            start_date,
            end_date: period_end(start_date)?,
            hours_used: -credit,
            carried_over_hours: credit,
            auto_renew: current.auto_renew,
            status: MembershipStatus::Active,
            created_at: now,
            updated_at: now,
        };
        MembershipRepository::insert(&mut tx, &renewed).await?;

        if plan.points_on_purchase > 0 {
            let description = format!("Membership renewal bonus: {}", plan.name);
            PointsLedgerService::post_in(
                &mut tx,
                &current.customer_id,
                LedgerOp::Bonus(plan.points_on_purchase),
                None,
                Some(&description),
                now,
            )
            .await?;
        }

        tx.commit().await?;

        info!(
            previous = %current.id,
            membership_id = %renewed.id,
            customer_id = %renewed.customer_id,
            carried_over_hours = credit,
            end_date = %renewed.end_date,
            "Membership renewed"
        );
        Ok(renewed)
    }

    /// Cancels an ACTIVE membership and turns off auto-renew.
    pub async fn cancel_membership(&self, membership_id: &str) -> ServiceResult<CustomerMembership> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let mut membership = MembershipRepository::lock(&mut tx, membership_id, now).await?;
        membership.ensure_active()?;

        MembershipRepository::set_status(&mut tx, membership_id, MembershipStatus::Cancelled, false, now)
            .await?;
        tx.commit().await?;

        membership.status = MembershipStatus::Cancelled;
        membership.auto_renew = false;
        membership.updated_at = now;

        info!(membership_id = %membership_id, customer_id = %membership.customer_id, "Membership cancelled");
        Ok(membership)
    }

    /// Expires or renews every ACTIVE membership past its end date.
    ///
    /// Each row is handled on its own; a failure is logged and the sweep
    /// moves on. Returns how many rows were processed successfully.
    pub async fn process_expired_memberships(&self) -> ServiceResult<usize> {
        let now = Utc::now();
        let lapsed: Vec<CustomerMembership> = self
            .db
            .memberships()
            .list_marked_active()
            .await?
            .into_iter()
            .filter(|m| m.is_lapsed_at(now))
            .collect();

        let mut processed = 0;
        for membership in &lapsed {
            let result = if membership.auto_renew {
                self.renew_membership(&membership.id, true).await.map(|_| ())
            } else {
                self.expire_membership(&membership.id).await
            };

            match result {
                Ok(()) => processed += 1,
                Err(e) => warn!(
                    membership_id = %membership.id,
                    error = %e,
                    "Failed to process expired membership"
                ),
            }
        }

        info!(found = lapsed.len(), processed, "Expiry sweep finished");
        Ok(processed)
    }

    async fn expire_membership(&self, membership_id: &str) -> ServiceResult<()> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let membership = MembershipRepository::lock(&mut tx, membership_id, now).await?;
        if !membership.is_lapsed_at(now) {
            // Renewed or cancelled since the sweep listed it.
            return Ok(());
        }

        MembershipRepository::set_status(
            &mut tx,
            membership_id,
            MembershipStatus::Expired,
            membership.auto_renew,
            now,
        )
        .await?;
        tx.commit().await?;

        info!(membership_id = %membership_id, customer_id = %membership.customer_id, "Membership expired");
        Ok(())
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    pub async fn get_membership_stats(&self) -> ServiceResult<MembershipStats> {
        Ok(self.db.memberships().stats(Utc::now()).await?)
    }

    /// Usage rows for a membership, oldest first.
    pub async fn get_usage_history(&self, membership_id: &str) -> ServiceResult<Vec<MembershipUsage>> {
        self.require_membership(membership_id).await?;
        Ok(self.db.memberships().usage_for(membership_id).await?)
    }

    /// Compares the usage rows with the membership's accumulator. Read-only.
    pub async fn reconcile_usage(&self, membership_id: &str) -> ServiceResult<UsageReconciliation> {
        let mut tx = self.db.begin().await?;
        let membership = MembershipRepository::get_in(&mut tx, membership_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Membership", membership_id))?;
        let usages = MembershipRepository::usage_in(&mut tx, membership_id).await?;
        tx.rollback().await?;

        let report = UsageReconciliation::new(&membership, &usages);
        if !report.is_consistent() {
            warn!(
                membership_id = %membership_id,
                usage_sum = report.usage_sum,
                expected_sum = report.expected_sum,
                "Membership usage does not reconcile"
            );
        }

        Ok(report)
    }

    async fn require_membership(&self, membership_id: &str) -> ServiceResult<CustomerMembership> {
        self.db
            .memberships()
            .get_by_id(membership_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Membership", membership_id))
    }
}
