//! # Membership Repository
//!
//! Membership periods (`customer_memberships`) and their append-only usage
//! audit trail (`membership_usages`).
//!
//! ## Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  purchase   insert()                                                    │
//! │  usage      lock() → add_hours() + insert_usage()                       │
//! │  renew      lock() → set_status(EXPIRED) + insert()                     │
//! │  cancel     lock() → set_status(CANCELLED, auto_renew = false)          │
//! │  expire     lock() → set_status(EXPIRED)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Whether a membership is current depends on `end_date` as well as
//! `status`; callers compare `end_date` against their own clock.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use meeple_core::{CustomerMembership, MembershipStats, MembershipStatus, MembershipUsage};

/// Repository for membership periods and usage.
#[derive(Debug, Clone)]
pub struct MembershipRepository {
    pool: SqlitePool,
}

impl MembershipRepository {
    /// Creates a new MembershipRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MembershipRepository { pool }
    }

    /// Gets a membership by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CustomerMembership>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    /// Memberships still marked ACTIVE for a customer, latest end first.
    pub async fn active_for_customer(&self, customer_id: &str) -> DbResult<Vec<CustomerMembership>> {
        fetch_active_for_customer(&self.pool, customer_id).await
    }

    /// Every membership marked ACTIVE. The expiry sweep filters these by
    /// end date.
    pub async fn list_marked_active(&self) -> DbResult<Vec<CustomerMembership>> {
        let rows = sqlx::query_as::<_, CustomerMembership>(
            r#"
            SELECT id, customer_id, plan_id, start_date, end_date, hours_used,
                   carried_over_hours, auto_renew, status, created_at, updated_at
            FROM customer_memberships
            WHERE status = 'ACTIVE'
            ORDER BY rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Aggregate reporting figures as of `now`.
    ///
    /// Hours used are counted from the period start, so carried-over
    /// credit is added back to the stored `hours_used`.
    pub async fn stats(&self, now: DateTime<Utc>) -> DbResult<MembershipStats> {
        let rows: Vec<(MembershipStatus, DateTime<Utc>, f64, i64)> = sqlx::query_as(
            r#"
            SELECT m.status, m.end_date, m.hours_used + m.carried_over_hours, p.price_minor
            FROM customer_memberships m
            JOIN membership_plans p ON p.id = m.plan_id
            WHERE m.status IN ('ACTIVE', 'EXPIRED')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let total_revenue_minor = rows.iter().map(|(_, _, _, price)| *price).sum();

        let active_hours: Vec<f64> = rows
            .iter()
            .filter(|(status, end_date, _, _)| *status == MembershipStatus::Active && *end_date >= now)
            .map(|(_, _, hours, _)| *hours)
            .collect();

        let average_hours_used = if active_hours.is_empty() {
            0.0
        } else {
            active_hours.iter().sum::<f64>() / active_hours.len() as f64
        };

        Ok(MembershipStats {
            active_memberships: active_hours.len() as i64,
            total_revenue_minor,
            average_hours_used,
        })
    }

    /// Usage rows for a membership, oldest first.
    pub async fn usage_for(&self, membership_id: &str) -> DbResult<Vec<MembershipUsage>> {
        let mut conn = self.pool.acquire().await?;
        Self::usage_in(&mut conn, membership_id).await
    }

    // =========================================================================
    // Transactional
    // =========================================================================

    /// Takes the write lock on a membership row and returns it.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - no such membership
    pub async fn lock(
        conn: &mut SqliteConnection,
        id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<CustomerMembership> {
        debug!(id = %id, "Locking membership row");

        sqlx::query_as::<_, CustomerMembership>(
            r#"
            UPDATE customer_memberships
            SET updated_at = ?2
            WHERE id = ?1
            RETURNING id, customer_id, plan_id, start_date, end_date, hours_used,
                      carried_over_hours, auto_renew, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Membership", id))
    }

    /// Gets a membership on the caller's connection.
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<CustomerMembership>> {
        let membership = sqlx::query_as::<_, CustomerMembership>(
            r#"
            SELECT id, customer_id, plan_id, start_date, end_date, hours_used,
                   carried_over_hours, auto_renew, status, created_at, updated_at
            FROM customer_memberships
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(membership)
    }

    /// [`active_for_customer`](Self::active_for_customer) on the caller's connection.
    pub async fn active_for_customer_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
    ) -> DbResult<Vec<CustomerMembership>> {
        fetch_active_for_customer(&mut *conn, customer_id).await
    }

    /// Inserts a membership period.
    pub async fn insert(conn: &mut SqliteConnection, membership: &CustomerMembership) -> DbResult<()> {
        debug!(
            id = %membership.id,
            customer_id = %membership.customer_id,
            plan_id = %membership.plan_id,
            "Inserting membership"
        );

        sqlx::query(
            r#"
            INSERT INTO customer_memberships (
                id, customer_id, plan_id, start_date, end_date, hours_used,
                carried_over_hours, auto_renew, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&membership.id)
        .bind(&membership.customer_id)
        .bind(&membership.plan_id)
        .bind(membership.start_date)
        .bind(membership.end_date)
        .bind(membership.hours_used)
        .bind(membership.carried_over_hours)
        .bind(membership.auto_renew)
        .bind(membership.status)
        .bind(membership.created_at)
        .bind(membership.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Moves a membership to `status` and sets `auto_renew`.
    pub async fn set_status(
        conn: &mut SqliteConnection,
        id: &str,
        status: MembershipStatus,
        auto_renew: bool,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id = %id, status = status.as_str(), "Updating membership status");

        let result = sqlx::query(
            r#"
            UPDATE customer_memberships
            SET status = ?2, auto_renew = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(auto_renew)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Membership", id));
        }

        Ok(())
    }

    /// Adds to the `hours_used` accumulator.
    pub async fn add_hours(
        conn: &mut SqliteConnection,
        id: &str,
        hours: f64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE customer_memberships
            SET hours_used = hours_used + ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(hours)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Membership", id));
        }

        Ok(())
    }

    /// Appends a usage audit row.
    pub async fn insert_usage(conn: &mut SqliteConnection, usage: &MembershipUsage) -> DbResult<()> {
        debug!(
            membership_id = %usage.membership_id,
            hours_used = usage.hours_used,
            overage_hours = usage.overage_hours,
            "Appending membership usage"
        );

        sqlx::query(
            r#"
            INSERT INTO membership_usages (
                id, membership_id, seat_session_id, hours_used,
                overage_hours, overage_charge_minor, description, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&usage.id)
        .bind(&usage.membership_id)
        .bind(&usage.seat_session_id)
        .bind(usage.hours_used)
        .bind(usage.overage_hours)
        .bind(usage.overage_charge_minor)
        .bind(&usage.description)
        .bind(usage.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Usage rows on the caller's connection, oldest first.
    pub async fn usage_in(conn: &mut SqliteConnection, membership_id: &str) -> DbResult<Vec<MembershipUsage>> {
        let rows = sqlx::query_as::<_, MembershipUsage>(
            r#"
            SELECT id, membership_id, seat_session_id, hours_used, overage_hours,
                   overage_charge_minor, description, created_at
            FROM membership_usages
            WHERE membership_id = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(membership_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}

async fn fetch_active_for_customer<'e, E>(executor: E, customer_id: &str) -> DbResult<Vec<CustomerMembership>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, CustomerMembership>(
        r#"
        SELECT id, customer_id, plan_id, start_date, end_date, hours_used,
               carried_over_hours, auto_renew, status, created_at, updated_at
        FROM customer_memberships
        WHERE customer_id = ?1 AND status = 'ACTIVE'
        ORDER BY end_date DESC
        "#,
    )
    .bind(customer_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use meeple_core::MembershipPlan;
    use uuid::Uuid;

    async fn setup() -> (Database, String, MembershipPlan) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let customer = db.customers().create("Ada", None).await.unwrap();
        let now = Utc::now();
        let plan = MembershipPlan {
            id: Uuid::new_v4().to_string(),
            name: "Regular".to_string(),
            description: None,
            price_minor: 500_000,
            hours_included: 20.0,
            overage_rate_minor: 30_000,
            points_on_purchase: 0,
            earn_rate_denominator: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.plans().insert(&plan).await.unwrap();
        (db, customer.id, plan)
    }

    fn membership(customer_id: &str, plan_id: &str, end_in: Duration) -> CustomerMembership {
        let now = Utc::now();
        CustomerMembership {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            plan_id: plan_id.to_string(),
            start_date: now - Duration::days(1),
            end_date: now + end_in,
            hours_used: 0.0,
            carried_over_hours: 0.0,
            auto_renew: false,
            status: MembershipStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_lock_and_add_hours() {
        let (db, customer_id, plan) = setup().await;
        let m = membership(&customer_id, &plan.id, Duration::days(29));

        let mut tx = db.begin().await.unwrap();
        MembershipRepository::insert(&mut tx, &m).await.unwrap();
        let locked = MembershipRepository::lock(&mut tx, &m.id, Utc::now()).await.unwrap();
        assert_eq!(locked.status, MembershipStatus::Active);
        MembershipRepository::add_hours(&mut tx, &m.id, 2.5, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let stored = db.memberships().get_by_id(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.hours_used, 2.5);
        assert_eq!(stored.plan_id, plan.id);
    }

    #[tokio::test]
    async fn test_stats_count_carried_over_hours_as_unused() {
        let (db, customer_id, plan) = setup().await;
        let mut renewed = membership(&customer_id, &plan.id, Duration::days(30));
        renewed.hours_used = -15.0;
        renewed.carried_over_hours = 15.0;
        let other = membership(&customer_id, &plan.id, Duration::days(20));

        let mut tx = db.begin().await.unwrap();
        MembershipRepository::insert(&mut tx, &renewed).await.unwrap();
        MembershipRepository::insert(&mut tx, &other).await.unwrap();
        MembershipRepository::add_hours(&mut tx, &renewed.id, 3.0, Utc::now()).await.unwrap();
        MembershipRepository::add_hours(&mut tx, &other.id, 5.0, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let stats = db.memberships().stats(Utc::now()).await.unwrap();
        assert_eq!(stats.active_memberships, 2);
        assert_eq!(stats.average_hours_used, 4.0);
    }

    #[tokio::test]
    async fn test_status_changes_and_stats() {
        let (db, customer_id, plan) = setup().await;
        let current = membership(&customer_id, &plan.id, Duration::days(10));
        let lapsed = membership(&customer_id, &plan.id, -Duration::days(1));

        let mut tx = db.begin().await.unwrap();
        MembershipRepository::insert(&mut tx, &current).await.unwrap();
        MembershipRepository::insert(&mut tx, &lapsed).await.unwrap();
        MembershipRepository::add_hours(&mut tx, &current.id, 4.0, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(db.memberships().active_for_customer(&customer_id).await.unwrap().len(), 2);
        assert_eq!(db.memberships().list_marked_active().await.unwrap().len(), 2);

        let stats = db.memberships().stats(Utc::now()).await.unwrap();
        assert_eq!(stats.active_memberships, 1);
        assert_eq!(stats.total_revenue_minor, 1_000_000);
        assert_eq!(stats.average_hours_used, 4.0);

        let mut tx = db.begin().await.unwrap();
        MembershipRepository::set_status(&mut tx, &lapsed.id, MembershipStatus::Cancelled, false, Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stats = db.memberships().stats(Utc::now()).await.unwrap();
        assert_eq!(stats.total_revenue_minor, 500_000);
        assert_eq!(db.memberships().active_for_customer(&customer_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_usage_rows() {
        let (db, customer_id, plan) = setup().await;
        let m = membership(&customer_id, &plan.id, Duration::days(29));

        let mut tx = db.begin().await.unwrap();
        MembershipRepository::insert(&mut tx, &m).await.unwrap();
        for hours in [1.0, 2.0] {
            let usage = MembershipUsage {
                id: Uuid::new_v4().to_string(),
                membership_id: m.id.clone(),
                seat_session_id: None,
                hours_used: hours,
                overage_hours: 0.0,
                overage_charge_minor: 0,
                description: Some("Seat time".to_string()),
                created_at: Utc::now(),
            };
            MembershipRepository::insert_usage(&mut tx, &usage).await.unwrap();
        }
        tx.commit().await.unwrap();

        let rows = db.memberships().usage_for(&m.id).await.unwrap();
        assert_eq!(rows.iter().map(|u| u.hours_used).collect::<Vec<_>>(), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_lock_missing() {
        let (db, _, _) = setup().await;
        let mut tx = db.begin().await.unwrap();
        assert!(matches!(
            MembershipRepository::lock(&mut tx, "missing", Utc::now()).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
