//! # gym-core: Pure Business Logic for the Gym Back Office
//!
//! Every rule with a real invariant in the back office lives here as a pure
//! function: stock status derivation, sale totals and all-or-nothing stock
//! checks, membership end-date computation and expiry, input validation.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Gym Back-Office Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/gym-worker (sweeps, reconcile)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        gym-engine (StockLedger, SaleProcessor, Memberships)     │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────────┐  ┌────────────▼───────────────┐   │
//! │  │   ★ gym-core (THIS CRATE) ★     │  │   gym-db (store traits +   │   │
//! │  │   types • money • stock •       │◄─│   SQLite adapter)          │   │
//! │  │   sale • membership • validation│  └────────────────────────────┘   │
//! │  │   NO I/O • PURE FUNCTIONS       │                                   │
//! │  └─────────────────────────────────┘                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, Sale, Member, CashMovement, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`stock`] - Stock status derivation
//! - [`sale`] - Sale planning: line validation, stock check, totals
//! - [`membership`] - Duration descriptors, end dates, expiry
//! - [`error`] - Domain error types
//! - [`validation`] - Field-level rules
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use gym_core::membership::DurationDescriptor;
//! use gym_core::stock::{derive_status, StockStatus};
//!
//! assert_eq!(derive_status(3, 5), StockStatus::LowStock);
//!
//! let monthly = DurationDescriptor::new(1, 0, 0);
//! let start = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//! let end = monthly.end_date(start).unwrap();
//! assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod membership;
pub mod money;
pub mod sale;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use membership::{DurationDescriptor, MembershipKind, PaymentStatus};
pub use money::Money;
pub use sale::{NewSaleItem, SalePlan};
pub use stock::{derive_status, DeltaPolicy, StockStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum line items allowed in a single sale.
pub const MAX_SALE_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
///
/// Guards against typing 1000 instead of 10 at the counter.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Reorder threshold applied when a product is created without one.
pub const DEFAULT_REORDER_THRESHOLD: i64 = 5;

/// Generates a new entity ID (UUID v4).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
