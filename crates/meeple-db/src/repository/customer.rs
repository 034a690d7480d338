//! # Customer Repository
//!
//! Customers and their cached points balance.
//!
//! The balance column is only ever written by [`CustomerRepository::set_balance`]
//! inside the same transaction that appends the matching ledger row.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use meeple_core::Customer;

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, email, points_balance, created_at, updated_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Inserts a customer.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - email already registered
    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, points_balance, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(customer.points_balance)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Creates a customer with a zero balance.
    pub async fn create(&self, name: &str, email: Option<&str>) -> DbResult<Customer> {
        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            email: email.map(str::to_string),
            points_balance: 0,
            created_at: now,
            updated_at: now,
        };

        self.insert(&customer).await?;
        Ok(customer)
    }

    /// Counts customers (for diagnostics and seeding).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Sum of every cached balance: outstanding points liability.
    pub async fn total_points_balance(&self) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(points_balance), 0) FROM customers")
            .fetch_one(&self.pool)
            .await?;

        Ok(total)
    }

    // =========================================================================
    // Transactional
    // =========================================================================

    /// Takes the write lock on a customer row and returns it.
    ///
    /// Must be the first statement of the transaction.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - no such customer
    pub async fn lock(conn: &mut SqliteConnection, id: &str, now: DateTime<Utc>) -> DbResult<Customer> {
        debug!(id = %id, "Locking customer row");

        sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers
            SET updated_at = ?2
            WHERE id = ?1
            RETURNING id, name, email, points_balance, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Customer", id))
    }

    /// Reads a customer on the transaction's connection.
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, email, points_balance, created_at, updated_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(customer)
    }

    /// Writes the cached balance.
    pub async fn set_balance(
        conn: &mut SqliteConnection,
        id: &str,
        balance: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id = %id, balance = balance, "Updating points balance");

        let result = sqlx::query(
            r#"
            UPDATE customers
            SET points_balance = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(balance)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        Ok(())
    }
}
