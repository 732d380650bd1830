//! # Engine Error Type
//!
//! What every engine operation returns on failure.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Back Office                        │
//! │                                                                         │
//! │  gym-core                      gym-db                                   │
//! │  ────────                      ──────                                   │
//! │  ValidationError ─► CoreError  DbError                                  │
//! │                        │          │                                     │
//! │                        ▼          ▼                                     │
//! │                 ┌──────────────────────────┐                            │
//! │                 │  EngineError (here)      │                            │
//! │                 │  .code()  → ErrorCode    │ ──► caller / worker logs   │
//! │                 │  .is_retryable()         │                            │
//! │                 └──────────────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every validation and precondition failure is raised before anything is
//! written. The two retryable kinds say nothing about what happened:
//! `ConcurrentModification` means nothing was written, `OutcomeUnknown` means
//! the write may or may not have landed and must be re-issued with the same
//! idempotency key.

use serde::Serialize;
use thiserror::Error;

use gym_core::{CoreError, SaleStatus, ValidationError};
use gym_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The record exists but belongs to another owner.
    #[error("{entity} {id} is not owned by the caller")]
    Forbidden { entity: String, id: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// `line_no` is set when the shortfall was found on a sale line.
    #[error("Insufficient stock for {code}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        code: String,
        line_no: Option<u32>,
        available: i64,
        requested: i64,
    },

    #[error("Membership type {type_id} is inactive")]
    InactiveMembershipType { type_id: String },

    #[error("Membership duration must have at least one non-zero component")]
    InvalidDuration,

    #[error("Sale {sale_id} is {current}, cannot perform operation")]
    InvalidSaleStatus { sale_id: String, current: SaleStatus },

    #[error("Duplicate {field}: '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Conditional writes kept losing to concurrent writers.
    #[error("{entity} {id} was modified concurrently ({attempts} attempts)")]
    ConcurrentModification {
        entity: String,
        id: String,
        attempts: u32,
    },

    /// A store call exceeded its timeout.
    #[error("Outcome of {operation} is unknown: store call timed out")]
    OutcomeUnknown { operation: String },

    /// A batch finished with some items failed.
    #[error("{} of {} items failed", failed.len(), succeeded + failed.len())]
    PartialFailure {
        succeeded: usize,
        failed: Vec<String>,
    },

    #[error("Store error: {0}")]
    Store(DbError),
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    Forbidden,
    ValidationError,
    InsufficientStock,
    InactiveMembershipType,
    InvalidDuration,
    InvalidSaleStatus,
    Duplicate,
    ConcurrentModification,
    OutcomeUnknown,
    PartialFailure,
    StoreError,
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn forbidden(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::Forbidden {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::Forbidden { .. } => ErrorCode::Forbidden,
            EngineError::Validation(_) => ErrorCode::ValidationError,
            EngineError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            EngineError::InactiveMembershipType { .. } => ErrorCode::InactiveMembershipType,
            EngineError::InvalidDuration => ErrorCode::InvalidDuration,
            EngineError::InvalidSaleStatus { .. } => ErrorCode::InvalidSaleStatus,
            EngineError::Duplicate { .. } => ErrorCode::Duplicate,
            EngineError::ConcurrentModification { .. } => ErrorCode::ConcurrentModification,
            EngineError::OutcomeUnknown { .. } => ErrorCode::OutcomeUnknown,
            EngineError::PartialFailure { .. } => ErrorCode::PartialFailure,
            EngineError::Store(_) => ErrorCode::StoreError,
        }
    }

    /// Returns true if re-issuing the same call may succeed.
    ///
    /// Stock deltas must be re-issued with the same idempotency key.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ConcurrentModification { .. } | EngineError::OutcomeUnknown { .. }
        )
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock {
                product_id,
                code,
                line_no,
                available,
                requested,
            } => EngineError::InsufficientStock {
                product_id,
                code,
                line_no: Some(line_no),
                available,
                requested,
            },
            CoreError::InvalidDuration => EngineError::InvalidDuration,
            CoreError::InactiveMembershipType(type_id) => {
                EngineError::InactiveMembershipType { type_id }
            }
            CoreError::InvalidSaleStatus {
                sale_id,
                current_status,
            } => EngineError::InvalidSaleStatus {
                sale_id,
                current: parse_status(&current_status),
            },
            CoreError::ProductNotFound(id) => EngineError::not_found("Product", id),
            CoreError::DateOutOfRange(reason) => EngineError::Validation(
                ValidationError::InvalidFormat {
                    field: "date".to_string(),
                    reason,
                },
            ),
            CoreError::Validation(e) => EngineError::Validation(e),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => EngineError::Duplicate { field, value },
            other => EngineError::Store(other),
        }
    }
}

fn parse_status(status: &str) -> SaleStatus {
    match status {
        "completed" => SaleStatus::Completed,
        "cancelling" => SaleStatus::Cancelling,
        "cancelled" => SaleStatus::Cancelled,
        _ => SaleStatus::Pending,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::ConcurrentModification).unwrap();
        assert_eq!(json, "\"CONCURRENT_MODIFICATION\"");

        let json = serde_json::to_string(&ErrorCode::InsufficientStock).unwrap();
        assert_eq!(json, "\"INSUFFICIENT_STOCK\"");
    }

    #[test]
    fn test_retryable() {
        let conflict = EngineError::ConcurrentModification {
            entity: "Product".into(),
            id: "p1".into(),
            attempts: 3,
        };
        assert!(conflict.is_retryable());

        let unknown = EngineError::OutcomeUnknown {
            operation: "apply_stock_write".into(),
        };
        assert!(unknown.is_retryable());

        assert!(!EngineError::InvalidDuration.is_retryable());
        assert!(!EngineError::not_found("Sale", "s1").is_retryable());
    }

    #[test]
    fn test_core_insufficient_stock_keeps_line() {
        let err: EngineError = CoreError::InsufficientStock {
            product_id: "q".into(),
            code: "Q".into(),
            line_no: 2,
            available: 1,
            requested: 2,
        }
        .into();

        match err {
            EngineError::InsufficientStock {
                line_no, available, ..
            } => {
                assert_eq!(line_no, Some(2));
                assert_eq!(available, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_db_unique_violation_becomes_duplicate() {
        let err: EngineError = DbError::duplicate("code", "WATER-500").into();
        assert_eq!(err.code(), ErrorCode::Duplicate);
    }

    #[test]
    fn test_partial_failure_message() {
        let err = EngineError::PartialFailure {
            succeeded: 3,
            failed: vec!["m1".into()],
        };
        assert_eq!(err.to_string(), "1 of 4 items failed");
    }
}
