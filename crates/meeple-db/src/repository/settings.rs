//! # Points Settings Repository
//!
//! The singleton `points_settings` row.
//!
//! ## First Access
//! ```text
//! INSERT ... ON CONFLICT(id) DO NOTHING   ← at most one row, even when two
//!      │                                    callers race on an empty table
//!      ▼
//! SELECT ... WHERE id = 'default'
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meeple_core::{PointsSettings, POINTS_SETTINGS_ID};

/// Repository for the singleton settings row.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Returns the settings row, creating it from `defaults` if absent.
    pub async fn get_or_create(&self, defaults: &PointsSettings) -> DbResult<PointsSettings> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO points_settings (
                id, regular_earn_rate, member_earn_rate, points_per_yen, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(POINTS_SETTINGS_ID)
        .bind(defaults.regular_earn_rate)
        .bind(defaults.member_earn_rate)
        .bind(defaults.points_per_yen)
        .bind(defaults.created_at)
        .bind(defaults.updated_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            debug!("Created default points settings");
        }

        self.get()
            .await?
            .ok_or_else(|| DbError::not_found("PointsSettings", POINTS_SETTINGS_ID))
    }

    /// Reads the settings row, if it exists.
    pub async fn get(&self) -> DbResult<Option<PointsSettings>> {
        let settings = sqlx::query_as::<_, PointsSettings>(
            r#"
            SELECT id, regular_earn_rate, member_earn_rate, points_per_yen, created_at, updated_at
            FROM points_settings
            WHERE id = ?1
            "#,
        )
        .bind(POINTS_SETTINGS_ID)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    /// Writes both earn rates, creating the row from `defaults` if needed.
    pub async fn update_rates(
        &self,
        defaults: &PointsSettings,
        regular_earn_rate: i64,
        member_earn_rate: i64,
        now: DateTime<Utc>,
    ) -> DbResult<PointsSettings> {
        debug!(regular_earn_rate, member_earn_rate, "Updating points settings");

        let settings = sqlx::query_as::<_, PointsSettings>(
            r#"
            INSERT INTO points_settings (
                id, regular_earn_rate, member_earn_rate, points_per_yen, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(id) DO UPDATE SET
                regular_earn_rate = excluded.regular_earn_rate,
                member_earn_rate = excluded.member_earn_rate,
                updated_at = excluded.updated_at
            RETURNING id, regular_earn_rate, member_earn_rate, points_per_yen, created_at, updated_at
            "#,
        )
        .bind(POINTS_SETTINGS_ID)
        .bind(regular_earn_rate)
        .bind(member_earn_rate)
        .bind(defaults.points_per_yen)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(settings)
    }
}
