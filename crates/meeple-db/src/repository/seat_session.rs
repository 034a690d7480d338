//! # Seat Session Repository
//!
//! Persisted seat timers. The frozen columns (`ended_at`, `billed_minutes`,
//! `billed_charge_minor`) are written once, guarded by `ended_at IS NULL`.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use meeple_core::SeatSession;

/// Repository for seat sessions.
#[derive(Debug, Clone)]
pub struct SeatSessionRepository {
    pool: SqlitePool,
}

impl SeatSessionRepository {
    /// Creates a new SeatSessionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SeatSessionRepository { pool }
    }

    /// Gets a session by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SeatSession>> {
        let session = sqlx::query_as::<_, SeatSession>(
            r#"
            SELECT id, seat_label, customer_id, opened_at, started_at, ended_at,
                   billed_minutes, billed_charge_minor, closed_at
            FROM seat_sessions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Sessions not yet paid, oldest first.
    pub async fn list_open(&self) -> DbResult<Vec<SeatSession>> {
        let sessions = sqlx::query_as::<_, SeatSession>(
            r#"
            SELECT id, seat_label, customer_id, opened_at, started_at, ended_at,
                   billed_minutes, billed_charge_minor, closed_at
            FROM seat_sessions
            WHERE closed_at IS NULL
            ORDER BY rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Inserts a new session.
    pub async fn insert(&self, session: &SeatSession) -> DbResult<()> {
        debug!(id = %session.id, seat = %session.seat_label, "Opening seat session");

        sqlx::query(
            r#"
            INSERT INTO seat_sessions (
                id, seat_label, customer_id, opened_at, started_at, ended_at,
                billed_minutes, billed_charge_minor, closed_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?4)
            "#,
        )
        .bind(&session.id)
        .bind(&session.seat_label)
        .bind(&session.customer_id)
        .bind(session.opened_at)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.billed_minutes)
        .bind(session.billed_charge_minor)
        .bind(session.closed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Transactional
    // =========================================================================

    /// Takes the write lock on a session row and returns it.
    pub async fn lock(conn: &mut SqliteConnection, id: &str, now: DateTime<Utc>) -> DbResult<SeatSession> {
        debug!(id = %id, "Locking seat session row");

        sqlx::query_as::<_, SeatSession>(
            r#"
            UPDATE seat_sessions
            SET updated_at = ?2
            WHERE id = ?1
            RETURNING id, seat_label, customer_id, opened_at, started_at, ended_at,
                      billed_minutes, billed_charge_minor, closed_at
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("SeatSession", id))
    }

    /// Records the timer start.
    pub async fn set_started(
        conn: &mut SqliteConnection,
        id: &str,
        started_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE seat_sessions
            SET started_at = ?2, updated_at = ?2
            WHERE id = ?1 AND started_at IS NULL
            "#,
        )
        .bind(id)
        .bind(started_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SeatSession with unstarted timer", id));
        }

        Ok(())
    }

    /// Freezes the stop time, billed minutes and the time line item.
    pub async fn freeze(conn: &mut SqliteConnection, session: &SeatSession) -> DbResult<()> {
        debug!(
            id = %session.id,
            billed_minutes = ?session.billed_minutes,
            billed_charge_minor = ?session.billed_charge_minor,
            "Freezing seat charge"
        );

        let result = sqlx::query(
            r#"
            UPDATE seat_sessions
            SET ended_at = ?2, billed_minutes = ?3, billed_charge_minor = ?4, updated_at = ?2
            WHERE id = ?1 AND ended_at IS NULL
            "#,
        )
        .bind(&session.id)
        .bind(session.ended_at)
        .bind(session.billed_minutes)
        .bind(session.billed_charge_minor)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SeatSession with running timer", &session.id));
        }

        Ok(())
    }

    /// Marks the session paid.
    pub async fn close(conn: &mut SqliteConnection, id: &str, closed_at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE seat_sessions
            SET closed_at = ?2, updated_at = ?2
            WHERE id = ?1 AND closed_at IS NULL
            "#,
        )
        .bind(id)
        .bind(closed_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Open SeatSession", id));
        }

        Ok(())
    }
}
