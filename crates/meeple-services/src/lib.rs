//! # meeple-services: Points, Memberships and Seat Settlement
//!
//! The service layer of Meeple POS. Owns every transaction boundary.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        meeple-services                                  │
//! │                                                                         │
//! │  ┌───────────────────┐   ┌────────────────────┐   ┌─────────────────┐  │
//! │  │  SeatSettlement   │──►│ MembershipService  │──►│ PointsLedger    │  │
//! │  │                   │   │                    │   │ Service         │  │
//! │  │ open / start /    │   │ purchase / renew / │   │                 │  │
//! │  │ stop / pay        │   │ cancel / track /   │   │ award / redeem /│  │
//! │  │                   │──────────────────────────►│ refund / bonus /│  │
//! │  └───────────────────┘   │ quote / sweep      │   │ adjust          │  │
//! │                          └─────────▲──────────┘   └─────────────────┘  │
//! │                                    │                                    │
//! │                          ┌─────────┴──────────┐                         │
//! │                          │   ExpirySweeper    │  (background task)      │
//! │                          └────────────────────┘                         │
//! │                                                                         │
//! │  ServiceConfig (meeple.toml + MEEPLE_* env)   ServiceError → ErrorCode  │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                │
//!                ▼
//!          meeple-db (repositories)  ──►  meeple-core (pure rules)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meeple_db::Database;
//! use meeple_services::{MembershipService, PointsLedgerService, ServiceConfig};
//!
//! let config = Arc::new(ServiceConfig::load(None)?);
//! let db = Arc::new(Database::new(config.database.db_config()).await?);
//!
//! let ledger = PointsLedgerService::new(db.clone(), config.clone());
//! let memberships = MembershipService::new(db.clone(), config.clone());
//!
//! let quote = memberships.calculate_time_charges(Some(&customer_id), 2.0, None).await?;
//! let points = ledger.calculate_points_earned(300_000, Some(&customer_id)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod ledger;
pub mod membership;
pub mod settlement;
pub mod sweeper;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, ServiceConfig};
pub use error::{ErrorBody, ErrorCode, ServiceError, ServiceResult};
pub use ledger::{PointsLedgerService, PostedEntry, Redemption};
pub use membership::{MembershipService, NewPlan, RecordedUsage};
pub use settlement::{SeatSettlement, SettledPayment, StoppedSession};
pub use sweeper::{ExpirySweeper, ExpirySweeperHandle};

use tracing_subscriber::EnvFilter;

/// Default directives when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,meeple=debug,sqlx=warn";

/// Builds the log filter: `RUST_LOG` wins, otherwise [`DEFAULT_LOG_FILTER`].
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global tracing subscriber.
pub fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(log_filter()).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_default_filter_quiets_sqlx() {
        let subscriber = tracing_subscriber::registry().with(EnvFilter::new(DEFAULT_LOG_FILTER));

        tracing::subscriber::with_default(subscriber, || {
            assert!(!tracing::enabled!(target: "sqlx::query", Level::DEBUG));
            assert!(tracing::enabled!(target: "sqlx::query", Level::WARN));
            assert!(tracing::enabled!(target: "meeple_services::ledger", Level::DEBUG));
            assert!(!tracing::enabled!(target: "meeple_services::ledger", Level::TRACE));
            assert!(tracing::enabled!(target: "other", Level::INFO));
            assert!(!tracing::enabled!(target: "other", Level::DEBUG));
        });
    }
}
