//! # Validation Module
//!
//! Input checks run before any read or write is attempted.
//!
//! ## Usage
//! ```rust
//! use meeple_core::validation::{validate_hours, validate_history_limit};
//!
//! validate_hours("hours_to_use", 2.5).unwrap();
//! assert_eq!(validate_history_limit(None).unwrap(), 50);
//! ```

use crate::error::ValidationError;
use crate::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a payment or order amount in minor units.
///
/// Zero is allowed (a fully comped order).
pub fn validate_amount_minor(field: &str, minor: i64) -> ValidationResult<()> {
    if minor < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates an earn or redemption rate (yen per point).
pub fn validate_rate(field: &str, rate: i64) -> ValidationResult<()> {
    if rate <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates an hour quantity.
///
/// ## Rules
/// - Must be a finite number
/// - Must not be negative
///
/// ```rust
/// use meeple_core::validation::validate_hours;
///
/// assert!(validate_hours("hours", 0.0).is_ok());
/// assert!(validate_hours("hours", -0.5).is_err());
/// assert!(validate_hours("hours", f64::NAN).is_err());
/// ```
pub fn validate_hours(field: &str, hours: f64) -> ValidationResult<()> {
    if !hours.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a finite number".to_string(),
        });
    }

    if hours < 0.0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Resolves a history page size.
///
/// `None` means the default page; zero or anything above the maximum is
/// rejected.
pub fn validate_history_limit(limit: Option<u32>) -> ValidationResult<u32> {
    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: MAX_HISTORY_LIMIT as i64,
        });
    }

    Ok(limit)
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (plans, customers, seats).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 200 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a free-text description or adjustment reason.
pub fn validate_description(field: &str, text: &str) -> ValidationResult<()> {
    if text.chars().count() > 500 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 500,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
