//! # Repository Module
//!
//! Database repository implementations for Meeple POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Service                                                               │
//! │       │                                                                 │
//! │       │  db.customers().get_by_id(id)          ← pool, one statement    │
//! │       │                                                                 │
//! │       │  let mut tx = db.begin().await?;                                │
//! │       │  CustomerRepository::lock(&mut *tx, id, now)  ← in transaction  │
//! │       │  PointsRepository::insert(&mut *tx, &entry)                     │
//! │       │  tx.commit().await?;                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking
//! `lock` functions are an UPDATE ... RETURNING on the contended row. Run
//! as the first statement of a transaction they take SQLite's write lock
//! before anything is read, so concurrent read-modify-write transactions on
//! the same customer or membership run one after another.
//!
//! ## Available Repositories
//!
//! - [`CustomerRepository`](customer::CustomerRepository) - Customers and cached balances
//! - [`PointsRepository`](points::PointsRepository) - Append-only points ledger
//! - [`SettingsRepository`](settings::SettingsRepository) - Singleton earn-rate settings
//! - [`PlanRepository`](plan::PlanRepository) - Membership plans
//! - [`MembershipRepository`](membership::MembershipRepository) - Membership periods and usage
//! - [`SeatSessionRepository`](seat_session::SeatSessionRepository) - Seat timers

pub mod customer;
pub mod membership;
pub mod plan;
pub mod points;
pub mod seat_session;
pub mod settings;
