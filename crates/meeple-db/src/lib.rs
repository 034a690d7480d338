//! # meeple-db: Database Layer for Meeple POS
//!
//! SQLite storage for customers, the points ledger, memberships and seat
//! sessions, accessed through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Meeple POS Data Flow                             │
//! │                                                                         │
//! │  meeple-services (PointsLedgerService, MembershipService, ...)         │
//! │       │  owns the transaction: db.begin() ... tx.commit()              │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     meeple-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌──────────────────┐   ┌─────────────┐  │   │
//! │  │   │   Database    │    │   Repositories   │   │ Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                  │   │ (embedded)  │  │   │
//! │  │   │               │    │ CustomerRepo     │   │             │  │   │
//! │  │   │ SqlitePool    │◄───│ PointsRepo       │   │ 001_init    │  │   │
//! │  │   │ begin()       │    │ SettingsRepo     │   │             │  │   │
//! │  │   │               │    │ PlanRepo         │   │             │  │   │
//! │  │   │               │    │ MembershipRepo   │   │             │  │   │
//! │  │   │               │    │ SeatSessionRepo  │   │             │  │   │
//! │  │   └───────────────┘    └──────────────────┘   └─────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (WAL)                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Kinds of Repository Call
//!
//! - `&self` methods run one statement on the pool (reads, single writes).
//! - Associated functions taking `&mut SqliteConnection` run inside a
//!   caller's transaction. Pass `&mut *tx`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meeple_db::{Database, DbConfig, CustomerRepository};
//!
//! let db = Database::new(DbConfig::new("./meeple.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! let balance = CustomerRepository::lock_balance(&mut *tx, &customer_id).await?;
//! // ... append ledger row, write new balance ...
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::customer::CustomerRepository;
pub use repository::membership::MembershipRepository;
pub use repository::plan::PlanRepository;
pub use repository::points::PointsRepository;
pub use repository::seat_session::SeatSessionRepository;
pub use repository::settings::SettingsRepository;
