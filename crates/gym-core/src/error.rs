//! # Error Types
//!
//! Domain-specific error types for gym-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  gym-core errors (this file)                                           │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  gym-db errors                                                         │
//! │  └── DbError          - Storage failures, CAS conflicts                │
//! │                                                                         │
//! │  gym-engine errors                                                     │
//! │  └── EngineError      - What callers see (with ErrorCode)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Not enough stock to cover a sale line.
    ///
    /// ## When This Occurs
    /// ```text
    /// Sale lines: [P ×3, Q ×2]
    ///      │
    ///      ▼
    /// Check stock: P=3 ✓, Q=1 ✗
    ///      │
    ///      ▼
    /// InsufficientStock { code: "Q", line_no: 2, available: 1, requested: 2 }
    ///      │
    ///      ▼
    /// Nothing is written - not even P's decrement
    /// ```
    #[error("Insufficient stock for {code} (line {line_no}): available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        code: String,
        line_no: u32,
        available: i64,
        requested: i64,
    },

    /// A membership duration with months, weeks and days all zero.
    #[error("Membership duration must have at least one non-zero component")]
    InvalidDuration,

    /// Assignment attempted against a disabled membership type.
    #[error("Membership type {0} is inactive")]
    InactiveMembershipType(String),

    /// Sale is not in a state that allows the requested operation.
    #[error("Sale {sale_id} is {current_status}, cannot perform operation")]
    InvalidSaleStatus {
        sale_id: String,
        current_status: String,
    },

    /// A sale line references a product that was not loaded.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// A date computation left the supported calendar range.
    #[error("Date out of range: {0}")]
    DateOutOfRange(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or positive.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Collection must not be empty.
    #[error("{field} must contain at least one entry")]
    Empty { field: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required { field: field.into() }
    }

    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive { field: field.into() }
    }

    pub fn must_not_be_negative(field: impl Into<String>) -> Self {
        ValidationError::MustNotBeNegative { field: field.into() }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
