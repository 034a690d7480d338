//! # Error Types
//!
//! Domain-specific error types for meeple-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  meeple-core errors (this file)                                        │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  meeple-db errors                                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  meeple-services errors                                                │
//! │  └── ServiceError     - NotFound / Conflict / InvalidState / ...       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → caller             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A redemption asked for more points than the customer holds.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout: "use 51 points"
    ///      │
    ///      ▼
    /// balance = 50
    ///      │
    ///      ▼
    /// InsufficientPoints { requested: 51, available: 50 }
    ///      │
    ///      ▼
    /// UI shows: "Only 50 points available"
    /// ```
    #[error("Insufficient points: requested {requested}, available {available}")]
    InsufficientPoints { requested: i64, available: i64 },

    /// The seat timer was started twice.
    #[error("Timer for seat session {session_id} is already running")]
    TimerAlreadyStarted { session_id: String },

    /// Stop or live charge requested on a session whose timer never started.
    #[error("Timer for seat session {session_id} has not been started")]
    TimerNotStarted { session_id: String },

    /// The timer was already stopped and its charge frozen.
    #[error("Timer for seat session {session_id} is already stopped")]
    TimerAlreadyStopped { session_id: String },

    /// A charge was requested for a session that starts after "now".
    #[error("Session start {started_at} is in the future (now {now})")]
    StartInFuture {
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// An end timestamp precedes its start.
    #[error("Session end {ended_at} precedes start {started_at}")]
    EndBeforeStart {
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    },

    /// A membership is not in a state that allows the operation.
    #[error("Membership {membership_id} is {status}, cannot perform operation")]
    InvalidMembershipStatus {
        membership_id: String,
        status: String,
    },

    /// A membership period end could not be represented.
    #[error("Cannot add one calendar month to {0}")]
    PeriodOverflow(DateTime<Utc>),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any mutation is attempted.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Value must be non-zero.
    #[error("{field} must not be zero")]
    MustNotBeZero { field: String },

    /// Invalid format (e.g., invalid UUID, malformed timestamp).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Result would not fit in an i64.
    #[error("{field} is too large")]
    Overflow { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientPoints {
            requested: 51,
            available: 50,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient points: requested 51, available 50"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::MustBePositive {
            field: "points".to_string(),
        };
        assert_eq!(err.to_string(), "points must be positive");

        let err = ValidationError::MustNotBeNegative {
            field: "amount".to_string(),
        };
        assert_eq!(err.to_string(), "amount must not be negative");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "customer_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
