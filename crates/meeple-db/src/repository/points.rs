//! # Points Ledger Repository
//!
//! Append-only `points_transactions`. Rows are inserted and read, never
//! updated or deleted. Insertion order (rowid) is commit order per customer
//! because every insert happens under that customer's row lock.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use meeple_core::PointsTransaction;

/// Repository for the points ledger.
#[derive(Debug, Clone)]
pub struct PointsRepository {
    pool: SqlitePool,
}

impl PointsRepository {
    /// Creates a new PointsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PointsRepository { pool }
    }

    /// Most recent entries for a customer, newest first.
    pub async fn history(&self, customer_id: &str, limit: u32) -> DbResult<Vec<PointsTransaction>> {
        let rows = sqlx::query_as::<_, PointsTransaction>(
            r#"
            SELECT id, customer_id, order_id, transaction_type, amount,
                   balance_after, description, created_at
            FROM points_transactions
            WHERE customer_id = ?1
            ORDER BY rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(customer_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Entries written against one order, oldest first.
    pub async fn for_order(&self, order_id: &str) -> DbResult<Vec<PointsTransaction>> {
        let rows = sqlx::query_as::<_, PointsTransaction>(
            r#"
            SELECT id, customer_id, order_id, transaction_type, amount,
                   balance_after, description, created_at
            FROM points_transactions
            WHERE order_id = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // =========================================================================
    // Transactional
    // =========================================================================

    /// Appends one ledger row.
    pub async fn insert(conn: &mut SqliteConnection, entry: &PointsTransaction) -> DbResult<()> {
        debug!(
            id = %entry.id,
            customer_id = %entry.customer_id,
            kind = entry.transaction_type.as_str(),
            amount = entry.amount,
            balance_after = entry.balance_after,
            "Appending points transaction"
        );

        sqlx::query(
            r#"
            INSERT INTO points_transactions (
                id, customer_id, order_id, transaction_type,
                amount, balance_after, description, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.customer_id)
        .bind(&entry.order_id)
        .bind(entry.transaction_type)
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Full ledger for a customer, oldest first, on the caller's connection.
    ///
    /// Read inside the same transaction as the cached balance so the two
    /// come from one snapshot.
    pub async fn ledger_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
    ) -> DbResult<Vec<PointsTransaction>> {
        let rows = sqlx::query_as::<_, PointsTransaction>(
            r#"
            SELECT id, customer_id, order_id, transaction_type, amount,
                   balance_after, description, created_at
            FROM points_transactions
            WHERE customer_id = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Utc;
    use meeple_core::PointsTransactionType;
    use uuid::Uuid;

    fn entry(customer_id: &str, amount: i64, balance_after: i64) -> PointsTransaction {
        PointsTransaction {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            order_id: Some("order-1".to_string()),
            transaction_type: PointsTransactionType::Earned,
            amount,
            balance_after,
            description: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_limited() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let customer = db.customers().create("Ada", None).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        for (amount, after) in [(10, 10), (20, 30), (5, 35)] {
            PointsRepository::insert(&mut tx, &entry(&customer.id, amount, after))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        let history = db.points().history(&customer.id, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].balance_after, 35);
        assert_eq!(history[1].balance_after, 30);

        // The in-memory pool holds one connection; release it before the
        // next pool query
        let mut conn = db.pool().acquire().await.unwrap();
        let ledger = PointsRepository::ledger_in(&mut conn, &customer.id).await.unwrap();
        drop(conn);
        assert_eq!(
            ledger.iter().map(|e| e.amount).collect::<Vec<_>>(),
            vec![10, 20, 5]
        );

        assert_eq!(db.points().for_order("order-1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_ledger_row_requires_customer() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let result = PointsRepository::insert(&mut tx, &entry("ghost", 1, 1)).await;
        assert!(matches!(
            result,
            Err(crate::DbError::ForeignKeyViolation { .. })
        ));
    }
}
