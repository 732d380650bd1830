//! # Validation Module
//!
//! Field-level business rules, checked before any store access.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Calling layer (HTTP, CLI)                                    │
//! │  └── Shape checks, deserialization                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: gym-engine services                                          │
//! │  └── THIS MODULE: business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints (quantity >= 0, amount > 0)                     │
//! │  ├── UNIQUE constraints (owner + code, idempotency keys)               │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use gym_core::validation::{validate_code, validate_quantity};
//!
//! validate_code("PROT-1KG").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::{MAX_ITEM_QUANTITY, MAX_SALE_ITEMS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_CODE_LEN: usize = 50;
const MAX_NAME_LEN: usize = 200;
const MAX_NOTES_LEN: usize = 1000;
const MIN_TYPE_NAME_LEN: usize = 2;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product code.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens and underscores only
///
/// ```rust
/// use gym_core::validation::validate_code;
///
/// assert!(validate_code("WATER-500").is_ok());
/// assert!(validate_code("").is_err());
/// assert!(validate_code("has space").is_err());
/// ```
pub fn validate_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::required("code"));
    }

    if code.chars().count() > MAX_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: MAX_CODE_LEN,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a required display name (product, member first/last name).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Membership type names need at least two characters.
pub fn validate_type_name(name: &str) -> ValidationResult<()> {
    validate_name("name", name)?;

    if name.trim().chars().count() < MIN_TYPE_NAME_LEN {
        return Err(ValidationError::TooShort {
            field: "name".to_string(),
            min: MIN_TYPE_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates an optional email. Only the basic `local@domain` shape is checked.
pub fn validate_email(email: Option<&str>) -> ValidationResult<()> {
    let Some(email) = email.map(str::trim) else {
        return Ok(());
    };

    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };

    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "email".to_string(),
            reason: "must look like name@example.com".to_string(),
        });
    }

    Ok(())
}

/// Free-text notes are optional but bounded.
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<()> {
    if let Some(notes) = notes {
        if notes.chars().count() > MAX_NOTES_LEN {
            return Err(ValidationError::TooLong {
                field: "notes".to_string(),
                max: MAX_NOTES_LEN,
            });
        }
    }
    Ok(())
}

/// Validates a search query and returns it trimmed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.chars().count() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a sale line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Sale unit prices and membership type prices must be strictly positive.
///
/// ```rust
/// use gym_core::validation::validate_positive_price;
///
/// assert!(validate_positive_price("unit_price", 1000).is_ok());
/// assert!(validate_positive_price("unit_price", 0).is_err());
/// ```
pub fn validate_positive_price(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::must_be_positive(field));
    }
    Ok(())
}

/// Catalog prices and costs may be zero but never negative.
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::must_not_be_negative(field));
    }
    Ok(())
}

/// Stock quantities and reorder thresholds are non-negative integers.
pub fn validate_stock_level(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::must_not_be_negative(field));
    }
    Ok(())
}

/// Cash movement amounts are positive; the kind carries the direction.
pub fn validate_movement_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::must_be_positive("amount"));
    }
    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines in a sale request.
pub fn validate_sale_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Empty {
            field: "items".to_string(),
        });
    }

    if lines > MAX_SALE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_code() {
        assert!(validate_code("PROT-1KG").is_ok());
        assert!(validate_code("towel_xl").is_ok());

        assert!(validate_code("").is_err());
        assert!(validate_code("   ").is_err());
        assert!(validate_code("two words").is_err());
        assert!(validate_code(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_type_name() {
        assert!(validate_type_name("Monthly").is_ok());
        assert!(matches!(
            validate_type_name("M"),
            Err(ValidationError::TooShort { min: 2, .. })
        ));
        assert!(matches!(
            validate_type_name(" "),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email(None).is_ok());
        assert!(validate_email(Some("ana@gym.mx")).is_ok());
        assert!(validate_email(Some("ana")).is_err());
        assert!(validate_email(Some("@gym.mx")).is_err());
        assert!(validate_email(Some("ana@localhost")).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_price_rules() {
        assert!(validate_positive_price("price", 1).is_ok());
        assert!(validate_positive_price("price", 0).is_err());
        assert!(validate_price_cents("cost", 0).is_ok());
        assert!(validate_price_cents("cost", -1).is_err());
    }

    #[test]
    fn test_validate_sale_size() {
        assert!(matches!(validate_sale_size(0), Err(ValidationError::Empty { .. })));
        assert!(validate_sale_size(1).is_ok());
        assert!(validate_sale_size(MAX_SALE_ITEMS).is_ok());
        assert!(validate_sale_size(MAX_SALE_ITEMS + 1).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "not-a-uuid").is_err());
    }
}
