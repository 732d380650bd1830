//! # Sale Planning
//!
//! Everything about a sale that can be decided before touching the store:
//! line validation, the all-or-nothing stock check, subtotals and total.
//!
//! ## Planning Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  items[] ──► validate_items()      empty? qty ≤ 0? price ≤ 0? too many? │
//! │                    │                                                    │
//! │                    ▼                                                    │
//! │  products ──► SalePlan::build()    stock check over ALL lines first     │
//! │                    │               (repeated products are summed)       │
//! │                    ▼                                                    │
//! │              SalePlan { items, total, decrements }                      │
//! │                    │                                                    │
//! │                    ▼                                                    │
//! │              gym-engine persists it and applies the decrements          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Product, SaleItem};
use crate::validation::{validate_positive_price, validate_quantity, validate_sale_size};

/// A requested sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub product_id: String,
    pub quantity: i64,
    /// Price charged per unit, snapshotted onto the line.
    pub unit_price_cents: i64,
}

impl NewSaleItem {
    pub fn new(product_id: impl Into<String>, quantity: i64, unit_price_cents: i64) -> Self {
        NewSaleItem {
            product_id: product_id.into(),
            quantity,
            unit_price_cents,
        }
    }
}

/// Shape checks on a sale request. Runs before any product is loaded.
pub fn validate_items(items: &[NewSaleItem]) -> CoreResult<()> {
    validate_sale_size(items.len())?;

    for item in items {
        if item.product_id.trim().is_empty() {
            return Err(ValidationError::required("product_id").into());
        }
        validate_quantity(item.quantity)?;
        validate_positive_price("unit_price", item.unit_price_cents)?;
    }

    Ok(())
}

/// A stock decrement the sale needs, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDecrement {
    pub line_no: u32,
    pub product_id: String,
    pub quantity: i64,
}

impl PlannedDecrement {
    /// The signed delta handed to the stock ledger.
    #[inline]
    pub fn delta(&self) -> i64 {
        -self.quantity
    }
}

/// A fully validated sale, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalePlan {
    pub items: Vec<SaleItem>,
    pub total: Money,
}

impl SalePlan {
    /// Builds the plan for `sale_id` against the loaded `products`.
    ///
    /// Fails with [`CoreError::InsufficientStock`] naming the first line at
    /// which the cumulative quantity for a product exceeds its stock. Nothing
    /// is returned in that case, so no line is ever partially applied.
    pub fn build(
        sale_id: &str,
        items: &[NewSaleItem],
        products: &HashMap<String, Product>,
    ) -> CoreResult<SalePlan> {
        validate_items(items)?;

        let mut requested: HashMap<&str, i64> = HashMap::new();
        for (idx, item) in items.iter().enumerate() {
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| CoreError::ProductNotFound(item.product_id.clone()))?;

            let cumulative = requested.entry(product.id.as_str()).or_insert(0);
            *cumulative += item.quantity;

            if !product.can_cover(*cumulative) {
                return Err(CoreError::InsufficientStock {
                    product_id: product.id.clone(),
                    code: product.code.clone(),
                    line_no: line_no(idx),
                    available: product.stock_quantity,
                    requested: *cumulative,
                });
            }
        }

        let mut lines = Vec::with_capacity(items.len());
        let mut total = Money::zero();
        for (idx, item) in items.iter().enumerate() {
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| CoreError::ProductNotFound(item.product_id.clone()))?;

            let subtotal = Money::from_cents(item.unit_price_cents)
                .checked_multiply_quantity(item.quantity)
                .ok_or_else(|| overflow("subtotal"))?;
            total = total.checked_add(subtotal).ok_or_else(|| overflow("total"))?;

            lines.push(SaleItem {
                sale_id: sale_id.to_string(),
                line_no: line_no(idx),
                product_id: product.id.clone(),
                code_snapshot: product.code.clone(),
                name_snapshot: product.name.clone(),
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                subtotal_cents: subtotal.cents(),
            });
        }

        Ok(SalePlan { items: lines, total })
    }

    /// Decrements in submission order, one per line.
    pub fn decrements(&self) -> Vec<PlannedDecrement> {
        self.items.iter().map(decrement_for).collect()
    }
}

/// The decrement a persisted line originally requested.
pub fn decrement_for(item: &SaleItem) -> PlannedDecrement {
    PlannedDecrement {
        line_no: item.line_no,
        product_id: item.product_id.clone(),
        quantity: item.quantity,
    }
}

fn line_no(idx: usize) -> u32 {
    u32::try_from(idx + 1).unwrap_or(u32::MAX)
}

fn overflow(field: &str) -> CoreError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
    .into()
}

// =============================================================================
// Idempotency Keys & Numbering
// =============================================================================

/// Stock journal key for a sale line decrement.
pub fn sale_line_key(sale_id: &str, line_no: u32) -> String {
    format!("{sale_id}:{line_no}:sale")
}

/// Stock journal key for undoing a line of a sale that failed mid-way.
pub fn reversal_key(sale_id: &str, line_no: u32) -> String {
    format!("{sale_id}:{line_no}:reversal")
}

/// Stock journal key for restoring a line of a cancelled sale.
pub fn cancel_key(sale_id: &str, line_no: u32) -> String {
    format!("{sale_id}:{line_no}:cancel")
}

/// Human-readable sale number: `V-YYYYMMDD-XXXXXX`.
///
/// The suffix is the first six hex digits of the sale id, uppercased.
///
/// ```rust
/// use chrono::NaiveDate;
/// use gym_core::sale::sale_number;
///
/// let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
/// let number = sale_number(date, "9f3c1a7e-0000-4000-8000-000000000000");
/// assert_eq!(number, "V-20240115-9F3C1A");
/// ```
pub fn sale_number(date: NaiveDate, sale_id: &str) -> String {
    let suffix: String = sale_id
        .chars()
        .filter(char::is_ascii_hexdigit)
        .take(6)
        .collect::<String>()
        .to_ascii_uppercase();
    format!("V-{}-{}", date.format("%Y%m%d"), suffix)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::derive_status;
    use chrono::Utc;

    fn product(id: &str, qty: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            owner_id: "owner".to_string(),
            code: id.to_uppercase(),
            name: format!("Product {id}"),
            description: None,
            cost_cents: 0,
            price_cents: 10,
            stock_quantity: qty,
            reorder_threshold: 5,
            status: derive_status(qty, 5),
            is_active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn catalog(products: &[Product]) -> HashMap<String, Product> {
        products.iter().map(|p| (p.id.clone(), p.clone())).collect()
    }

    #[test]
    fn test_totals_from_snapshotted_prices() {
        let products = catalog(&[product("p", 3), product("q", 2)]);
        let items = vec![NewSaleItem::new("p", 3, 10), NewSaleItem::new("q", 2, 5)];

        let plan = SalePlan::build("sale-1", &items, &products).unwrap();

        assert_eq!(plan.total.cents(), 35);
        assert_eq!(plan.items[0].subtotal_cents, 30);
        assert_eq!(plan.items[1].subtotal_cents, 10);
        assert_eq!(plan.items[1].code_snapshot, "Q");
        let summed: Money = plan.items.iter().map(SaleItem::subtotal).sum();
        assert_eq!(summed, plan.total);
    }

    #[test]
    fn test_insufficient_stock_names_first_offending_line() {
        let products = catalog(&[product("p", 3), product("q", 1)]);
        let items = vec![NewSaleItem::new("p", 3, 10), NewSaleItem::new("q", 2, 5)];

        let err = SalePlan::build("sale-1", &items, &products).unwrap_err();

        assert_eq!(
            err,
            CoreError::InsufficientStock {
                product_id: "q".to_string(),
                code: "Q".to_string(),
                line_no: 2,
                available: 1,
                requested: 2,
            }
        );
    }

    #[test]
    fn test_repeated_product_quantities_are_summed() {
        let products = catalog(&[product("p", 4)]);
        let items = vec![NewSaleItem::new("p", 3, 10), NewSaleItem::new("p", 2, 10)];

        let err = SalePlan::build("sale-1", &items, &products).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { line_no: 2, requested: 5, .. }
        ));
    }

    #[test]
    fn test_rejects_bad_lines() {
        let products = catalog(&[product("p", 10)]);

        assert!(SalePlan::build("s", &[], &products).is_err());
        assert!(SalePlan::build("s", &[NewSaleItem::new("p", 0, 10)], &products).is_err());
        assert!(SalePlan::build("s", &[NewSaleItem::new("p", 1, 0)], &products).is_err());
        assert!(SalePlan::build("s", &[NewSaleItem::new("p", 1, -5)], &products).is_err());
    }

    #[test]
    fn test_missing_product_reported() {
        let err = SalePlan::build("s", &[NewSaleItem::new("ghost", 1, 10)], &HashMap::new())
            .unwrap_err();
        assert_eq!(err, CoreError::ProductNotFound("ghost".to_string()));
    }

    #[test]
    fn test_decrements_follow_submission_order() {
        let products = catalog(&[product("p", 5), product("q", 5)]);
        let items = vec![NewSaleItem::new("q", 1, 10), NewSaleItem::new("p", 2, 10)];

        let plan = SalePlan::build("s", &items, &products).unwrap();
        let decrements = plan.decrements();

        assert_eq!(decrements[0].product_id, "q");
        assert_eq!(decrements[0].delta(), -1);
        assert_eq!(decrements[1].line_no, 2);
        assert_eq!(decrements[1].delta(), -2);
    }

    #[test]
    fn test_idempotency_keys() {
        assert_eq!(sale_line_key("s1", 2), "s1:2:sale");
        assert_eq!(reversal_key("s1", 2), "s1:2:reversal");
        assert_eq!(cancel_key("s1", 2), "s1:2:cancel");
    }
}
