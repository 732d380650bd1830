//! # Stock Status
//!
//! A product's status is never stored independently of its quantity: it is a
//! pure function of `(quantity, reorder_threshold)` and is recomputed on every
//! write that touches either field.
//!
//! ```text
//!  quantity:   0        1 ........ threshold      threshold+1 ...
//!              │        │                │         │
//!  status:  out_of_stock └── low_stock ──┘         └── in_stock
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Stock Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives the stock status for a quantity and reorder threshold.
///
/// Negative quantities cannot be persisted but are treated as out of stock
/// so the function is total.
///
/// ```rust
/// use gym_core::stock::{derive_status, StockStatus};
///
/// assert_eq!(derive_status(10, 5), StockStatus::InStock);
/// assert_eq!(derive_status(5, 5), StockStatus::LowStock);
/// assert_eq!(derive_status(0, 5), StockStatus::OutOfStock);
/// ```
pub fn derive_status(quantity: i64, threshold: i64) -> StockStatus {
    if quantity <= 0 {
        StockStatus::OutOfStock
    } else if quantity <= threshold {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}

// =============================================================================
// Delta Policy
// =============================================================================

/// What to do when a negative delta exceeds the quantity on hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaPolicy {
    /// Clamp the resulting quantity to zero.
    #[default]
    Clamp,
    /// Refuse the write.
    Strict,
}

/// Outcome of applying a delta to a quantity, before it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedDelta {
    pub new_quantity: i64,
    /// The delta actually applied; differs from the requested one when clamped.
    pub applied_delta: i64,
    pub new_status: StockStatus,
}

/// Computes the new quantity for `current + delta` under a policy.
///
/// Returns `None` when the policy is [`DeltaPolicy::Strict`] and the delta
/// would take the quantity below zero.
///
/// ```rust
/// use gym_core::stock::{plan_delta, DeltaPolicy, StockStatus};
///
/// let planned = plan_delta(10, 5, -7, DeltaPolicy::Clamp).unwrap();
/// assert_eq!(planned.new_quantity, 3);
/// assert_eq!(planned.new_status, StockStatus::LowStock);
///
/// let clamped = plan_delta(2, 5, -7, DeltaPolicy::Clamp).unwrap();
/// assert_eq!((clamped.new_quantity, clamped.applied_delta), (0, -2));
///
/// assert!(plan_delta(2, 5, -7, DeltaPolicy::Strict).is_none());
/// ```
pub fn plan_delta(
    current: i64,
    threshold: i64,
    delta: i64,
    policy: DeltaPolicy,
) -> Option<PlannedDelta> {
    let raw = current.saturating_add(delta);
    let new_quantity = if raw < 0 {
        match policy {
            DeltaPolicy::Clamp => 0,
            DeltaPolicy::Strict => return None,
        }
    } else {
        raw
    };

    Some(PlannedDelta {
        new_quantity,
        applied_delta: new_quantity - current,
        new_status: derive_status(new_quantity, threshold),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_boundaries() {
        assert_eq!(derive_status(0, 5), StockStatus::OutOfStock);
        assert_eq!(derive_status(1, 5), StockStatus::LowStock);
        assert_eq!(derive_status(5, 5), StockStatus::LowStock);
        assert_eq!(derive_status(6, 5), StockStatus::InStock);
    }

    #[test]
    fn test_zero_threshold_skips_low_stock() {
        assert_eq!(derive_status(1, 0), StockStatus::InStock);
        assert_eq!(derive_status(0, 0), StockStatus::OutOfStock);
    }

    #[test]
    fn test_plan_delta_scenario_ten_minus_seven() {
        assert_eq!(derive_status(10, 5), StockStatus::InStock);
        let planned = plan_delta(10, 5, -7, DeltaPolicy::Strict).unwrap();
        assert_eq!(planned.new_quantity, 3);
        assert_eq!(planned.applied_delta, -7);
        assert_eq!(planned.new_status, StockStatus::LowStock);
    }

    #[test]
    fn test_plan_delta_clamps_to_zero() {
        let planned = plan_delta(3, 5, -10, DeltaPolicy::Clamp).unwrap();
        assert_eq!(planned.new_quantity, 0);
        assert_eq!(planned.applied_delta, -3);
        assert_eq!(planned.new_status, StockStatus::OutOfStock);
    }

    #[test]
    fn test_plan_delta_strict_allows_exact_depletion() {
        let planned = plan_delta(3, 5, -3, DeltaPolicy::Strict).unwrap();
        assert_eq!(planned.new_quantity, 0);
        assert!(plan_delta(3, 5, -4, DeltaPolicy::Strict).is_none());
    }

    #[test]
    fn test_status_consistent_for_every_result() {
        for current in 0..20 {
            for delta in -25..25 {
                if let Some(p) = plan_delta(current, 5, delta, DeltaPolicy::Clamp) {
                    assert!(p.new_quantity >= 0);
                    assert_eq!(p.new_status, derive_status(p.new_quantity, 5));
                    assert_eq!(current + p.applied_delta, p.new_quantity);
                }
            }
        }
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&StockStatus::OutOfStock).unwrap();
        assert_eq!(json, "\"out_of_stock\"");
    }
}
