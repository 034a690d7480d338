//! # meeple-core: Pure Business Logic for Meeple POS
//!
//! The rules that turn seat time into money and money into loyalty points.
//! Everything here is a pure function over plain data.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Meeple POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Seat timer / Checkout / Admin UI (external)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   meeple-services: PointsLedgerService, MembershipService,      │   │
//! │  │                    SeatSettlement, ExpirySweeper                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ meeple-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  billing  │  │  points   │  │membership │  │ validation│  │   │
//! │  │   │ RateTable │  │ LedgerOp  │  │UsageSplit │  │   rules   │  │   │
//! │  │   │TimeCharge │  │ Settings  │  │  Plans    │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  meeple-db (Database Layer)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`billing`] - Rate table and the seat-time charge calculator
//! - [`points`] - Ledger entry kinds, earn-rate math, balance postings
//! - [`membership`] - Plans, memberships, included/overage hour split
//! - [`types`] - Customer and seat session entities
//! - [`money`] - Money in minor units (100 = ¥1)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use meeple_core::points::calculate_points_earned;
//!
//! // ¥5,000 spent (500000 minor units) at 50 yen per point
//! assert_eq!(calculate_points_earned(500_000, 50).unwrap(), 100);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod billing;
pub mod error;
pub mod membership;
pub mod money;
pub mod points;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use billing::{ChargeBreakdown, RateTable, RateTier, TimeCharge};
pub use error::{CoreError, CoreResult, ValidationError};
pub use membership::{
    ActiveMembership, CustomerMembership, MembershipPlan, MembershipStats, MembershipStatus,
    MembershipUsage, TimeChargeQuote, UsageReconciliation, UsageSplit,
};
pub use money::Money;
pub use points::{
    LedgerOp, LedgerPosting, LedgerReconciliation, PointsSettings, PointsTransaction,
    PointsTransactionType,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Primary key of the singleton points settings row.
pub const POINTS_SETTINGS_ID: &str = "default";

/// Minor currency units per yen.
pub const MINOR_UNITS_PER_YEN: i64 = 100;

/// Default hourly rate (minor units) used when quoting seat time without
/// a membership.
pub const DEFAULT_REGULAR_HOURLY_RATE: i64 = 50_000;

/// Default number of ledger rows returned by a history query.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Upper bound on a single history page.
pub const MAX_HISTORY_LIMIT: u32 = 500;
