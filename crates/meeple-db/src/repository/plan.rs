//! # Membership Plan Repository
//!
//! Plans are soft-deleted (`is_active = 0`) so memberships that reference
//! them keep resolving for renewals and reporting.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use meeple_core::MembershipPlan;

/// Repository for membership plans.
#[derive(Debug, Clone)]
pub struct PlanRepository {
    pool: SqlitePool,
}

impl PlanRepository {
    /// Creates a new PlanRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PlanRepository { pool }
    }

    /// Active plans, cheapest first.
    pub async fn list_active(&self) -> DbResult<Vec<MembershipPlan>> {
        let plans = sqlx::query_as::<_, MembershipPlan>(
            r#"
            SELECT id, name, description, price_minor, hours_included, overage_rate_minor,
                   points_on_purchase, earn_rate_denominator, is_active, created_at, updated_at
            FROM membership_plans
            WHERE is_active = 1
            ORDER BY price_minor ASC, name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(plans)
    }

    /// Gets a plan by ID, active or not.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<MembershipPlan>> {
        let plan = sqlx::query_as::<_, MembershipPlan>(
            r#"
            SELECT id, name, description, price_minor, hours_included, overage_rate_minor,
                   points_on_purchase, earn_rate_denominator, is_active, created_at, updated_at
            FROM membership_plans
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan)
    }

    /// Inserts a plan.
    pub async fn insert(&self, plan: &MembershipPlan) -> DbResult<()> {
        debug!(id = %plan.id, name = %plan.name, "Inserting membership plan");

        sqlx::query(
            r#"
            INSERT INTO membership_plans (
                id, name, description, price_minor, hours_included, overage_rate_minor,
                points_on_purchase, earn_rate_denominator, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.price_minor)
        .bind(plan.hours_included)
        .bind(plan.overage_rate_minor)
        .bind(plan.points_on_purchase)
        .bind(plan.earn_rate_denominator)
        .bind(plan.is_active)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Soft-deletes a plan.
    pub async fn deactivate(&self, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        debug!(id = %id, "Deactivating membership plan");

        let result = sqlx::query(
            r#"
            UPDATE membership_plans
            SET is_active = 0, updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("MembershipPlan", id));
        }

        Ok(())
    }

    /// Counts plans (for seeding).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM membership_plans")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Transactional
    // =========================================================================

    /// Gets a plan on the transaction's connection.
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<MembershipPlan>> {
        let plan = sqlx::query_as::<_, MembershipPlan>(
            r#"
            SELECT id, name, description, price_minor, hours_included, overage_rate_minor,
                   points_on_purchase, earn_rate_denominator, is_active, created_at, updated_at
            FROM membership_plans
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(plan)
    }
}
