//! # Repository Module
//!
//! SQLite implementations of the [`crate::store`] traits.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  gym-engine                                                            │
//! │       │  catalog.apply_stock_write(&request)                           │
//! │       ▼                                                                 │
//! │  ProductRepository (impl CatalogStore)                                 │
//! │  ├── BEGIN                                                             │
//! │  ├── SELECT journal WHERE idempotency_key = ?   → DuplicateKey         │
//! │  ├── UPDATE products ... WHERE version = ?      → Conflict if 0 rows   │
//! │  ├── INSERT INTO stock_journal                                         │
//! │  └── COMMIT                                     → Applied              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inside a transaction every statement goes through the transaction
//! handle, never the pool: in-memory databases have a single connection.
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Products, stock writes, stock journal
//! - [`sale::SaleRepository`] - Sales, line items, status transitions
//! - [`movement::MovementRepository`] - Cash movements
//! - [`membership::MembershipRepository`] - Membership types and instances
//! - [`member::MemberRepository`] - Members

pub mod member;
pub mod membership;
pub mod movement;
pub mod product;
pub mod sale;

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("prot"), "%prot%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
