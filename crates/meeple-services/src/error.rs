//! # Service Error Type
//!
//! One error type for every service operation, with a machine-readable
//! code for the admin UI.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  meeple-core                meeple-db                                   │
//! │  ───────────                ─────────                                   │
//! │  ValidationError ──┐        DbError::NotFound ─────────┐                │
//! │  CoreError ────────┤        DbError::UniqueViolation ──┤                │
//! │                    │        DbError::* ────────────────┤                │
//! │                    ▼                                   ▼                │
//! │               ┌──────────────────────────────────────────────┐          │
//! │               │ ServiceError                                 │          │
//! │               │   NotFound          → NOT_FOUND              │          │
//! │               │   Conflict          → CONFLICT               │          │
//! │               │   InvalidState      → INVALID_STATE          │          │
//! │               │   InsufficientPoints→ INSUFFICIENT_POINTS    │          │
//! │               │   Validation        → VALIDATION_ERROR       │          │
//! │               │   Database          → DATABASE_ERROR         │          │
//! │               └──────────────────────────────────────────────┘          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A rejected operation leaves state unchanged: every mutation runs in a
//! transaction that is dropped (rolled back) when an error propagates.

use meeple_core::{CoreError, ValidationError};
use meeple_db::DbError;
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

/// Result alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by the services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Referenced customer, membership, plan or session does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The operation would break a uniqueness rule (second active
    /// membership, duplicate email).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The entity is in the wrong state for the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient points: requested {requested}, available {available}")]
    InsufficientPoints { requested: i64, available: i64 },

    /// Input rejected before any mutation.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(DbError),
}

impl ServiceError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Conflict(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ServiceError::InvalidState(message.into())
    }

    /// The machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::NotFound { .. } => ErrorCode::NotFound,
            ServiceError::Conflict(_) => ErrorCode::Conflict,
            ServiceError::InvalidState(_) => ErrorCode::InvalidState,
            ServiceError::InsufficientPoints { .. } => ErrorCode::InsufficientPoints,
            ServiceError::Validation(_) => ErrorCode::ValidationError,
            ServiceError::Database(_) => ErrorCode::DatabaseError,
        }
    }

    /// The payload handed to the UI.
    ///
    /// Database failures get a generic message; the detail is logged.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            ServiceError::Database(e) => {
                tracing::error!(error = %e, "Database operation failed");
                "Database operation failed".to_string()
            }
            other => other.to_string(),
        };

        ErrorBody {
            code: self.code(),
            message,
        }
    }
}

/// Error codes for UI handling.
///
/// ```typescript
/// switch (e.code) {
///   case 'INSUFFICIENT_POINTS': showBalance(); break;
///   case 'CONFLICT':            showAlreadyMember(); break;
///   default:                    showError(e.message);
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found (404)
    NotFound,

    /// Uniqueness rule violated (409)
    Conflict,

    /// Wrong lifecycle state (409)
    InvalidState,

    /// Redemption exceeds the balance (422)
    InsufficientPoints,

    /// Input validation failed (400)
    ValidationError,

    /// Database operation failed (500)
    DatabaseError,
}

/// Serialized error.
///
/// ```json
/// { "code": "NOT_FOUND", "message": "Customer not found: 9f1c..." }
/// ```
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

// =============================================================================
// Conversions
// =============================================================================

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => {
                ServiceError::Conflict(format!("{} '{}' already exists", field, value))
            }
            DbError::ForeignKeyViolation { message } => {
                ServiceError::Validation(format!("Invalid reference: {}", message))
            }
            other => ServiceError::Database(other),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientPoints {
                requested,
                available,
            } => ServiceError::InsufficientPoints {
                requested,
                available,
            },
            e @ (CoreError::TimerAlreadyStarted { .. }
            | CoreError::TimerNotStarted { .. }
            | CoreError::TimerAlreadyStopped { .. }
            | CoreError::InvalidMembershipStatus { .. }) => ServiceError::InvalidState(e.to_string()),
            e @ (CoreError::StartInFuture { .. }
            | CoreError::EndBeforeStart { .. }
            | CoreError::PeriodOverflow(_)) => ServiceError::Validation(e.to_string()),
            CoreError::Validation(e) => e.into(),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_not_found_maps_to_not_found() {
        let err: ServiceError = DbError::not_found("Customer", "c-1").into();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.to_string(), "Customer not found: c-1");
    }

    #[test]
    fn test_insufficient_points_keeps_numbers() {
        let err: ServiceError = CoreError::InsufficientPoints {
            requested: 51,
            available: 50,
        }
        .into();
        assert!(matches!(
            err,
            ServiceError::InsufficientPoints {
                requested: 51,
                available: 50
            }
        ));
    }

    #[test]
    fn test_validation_codes() {
        let err: ServiceError = ValidationError::MustBePositive {
            field: "points".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err: ServiceError = CoreError::TimerNotStarted {
            session_id: "s".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }

    #[test]
    fn test_body_serializes_screaming_code() {
        let body = ServiceError::conflict("already a member").to_body();
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"code\":\"CONFLICT\""));
    }

    #[test]
    fn test_database_message_is_generic() {
        let body = ServiceError::from(DbError::QueryFailed("disk I/O".into())).to_body();
        assert_eq!(body.code, ErrorCode::DatabaseError);
        assert_eq!(body.message, "Database operation failed");
    }
}
