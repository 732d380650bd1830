//! # Domain Types
//!
//! Records used throughout the back office.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Inventory & sales             Memberships                              │
//! │  ┌─────────────────┐           ┌──────────────────┐                     │
//! │  │    Product      │           │  MembershipType  │                     │
//! │  │  code, stock,   │           │  name, price,    │                     │
//! │  │  status,version │           │  duration        │                     │
//! │  └────────┬────────┘           └────────┬─────────┘                     │
//! │           │ snapshot                    │ snapshot                      │
//! │  ┌────────▼────────┐           ┌────────▼─────────┐   ┌──────────┐     │
//! │  │ Sale / SaleItem │           │ MemberMembership │◄──│  Member  │     │
//! │  └────────┬────────┘           └──────────────────┘   └──────────┘     │
//! │           │                                                             │
//! │  ┌────────▼────────┐  ┌───────────────────┐                             │
//! │  │  CashMovement   │  │ StockJournalEntry │  one per stock write        │
//! │  └─────────────────┘  └───────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every record carries `owner_id`: the account that created it and the only
//! one allowed to read or change it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::membership::{DurationDescriptor, MembershipKind, PaymentStatus};
use crate::money::Money;
use crate::stock::StockStatus;

// =============================================================================
// Product
// =============================================================================

/// A product held in inventory and sold at the front desk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub owner_id: String,
    /// Human code, unique per owner.
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub cost_cents: i64,
    pub price_cents: i64,
    pub stock_quantity: i64,
    pub reorder_threshold: i64,
    /// Always `derive_status(stock_quantity, reorder_threshold)`.
    pub status: StockStatus,
    /// Soft-disable flag. Disabled products cannot be sold.
    pub is_active: bool,
    /// Bumped on every write; the compare-and-swap token.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// True when the quantity on hand covers `quantity`.
    #[inline]
    pub fn can_cover(&self, quantity: i64) -> bool {
        self.stock_quantity >= quantity
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub cost_cents: i64,
    pub price_cents: i64,
    pub stock_quantity: i64,
    /// Defaults to [`crate::DEFAULT_REORDER_THRESHOLD`].
    pub reorder_threshold: Option<i64>,
}

/// Administrative edit of a product. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub cost_cents: Option<i64>,
    pub price_cents: Option<i64>,
    pub stock_quantity: Option<i64>,
    pub reorder_threshold: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductFilter {
    pub status: Option<StockStatus>,
    /// Substring matched against code and name.
    pub search: Option<String>,
    pub include_inactive: bool,
}

// =============================================================================
// Sale Status
// =============================================================================

/// Lifecycle of a sale.
///
/// ```text
///   pending ──► completed ──► cancelling ──► cancelled
///      │                                        ▲
///      └──────► reverting ──────────────────────┘
/// ```
///
/// `reverting` is claimed by whoever rolls a pending sale back (its creator
/// after a failed line, or the reconciler). Once claimed, the creator's
/// pending → completed write can no longer land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    /// Persisted, stock decrements in flight.
    Pending,
    Completed,
    /// Cancellation accepted, stock restoration in flight.
    Cancelling,
    /// A pending sale being rolled back, reversals in flight.
    Reverting,
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelling => "cancelling",
            SaleStatus::Reverting => "reverting",
            SaleStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Transfer,
}

// =============================================================================
// Sale
// =============================================================================

/// A sale with its snapshotted line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub owner_id: String,
    /// Human-readable number, `V-YYYYMMDD-XXXXXX`.
    pub number: String,
    pub status: SaleStatus,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Loaded separately from `sale_items`.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<SaleItem>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Sum of the persisted line subtotals.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(SaleItem::subtotal).sum()
    }
}

/// A sale line. Product code, name and unit price are frozen at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub sale_id: String,
    /// 1-based position in the submitted order.
    pub line_no: u32,
    pub product_id: String,
    pub code_snapshot: String,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// `quantity × unit_price_cents`.
    pub subtotal_cents: i64,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    pub min_total_cents: Option<i64>,
    pub max_total_cents: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

// =============================================================================
// Stock Journal
// =============================================================================

/// Why a stock write happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    Sale,
    /// Compensation for a sale that failed mid-way.
    SaleReversal,
    SaleCancellation,
    Adjustment,
}

/// One applied stock write, persisted atomically with the product update.
///
/// A unique `idempotency_key` makes re-issuing the same logical delta a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockJournalEntry {
    pub id: String,
    pub product_id: String,
    pub owner_id: String,
    pub idempotency_key: Option<String>,
    pub requested_delta: i64,
    pub applied_delta: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub new_status: StockStatus,
    pub sale_id: Option<String>,
    pub reason: StockReason,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Cash Movements
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Income,
    Expense,
}

/// Money in or out of the till.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashMovement {
    pub id: String,
    pub owner_id: String,
    pub kind: MovementKind,
    pub concept: String,
    /// Always positive; `kind` carries the direction.
    pub amount_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    pub reference_table: Option<String>,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CashMovement {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Positive for income, negative for expense.
    pub fn signed_amount(&self) -> Money {
        match self.kind {
            MovementKind::Income => self.amount(),
            MovementKind::Expense => Money::from_cents(-self.amount_cents),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCashMovement {
    pub kind: MovementKind,
    pub concept: String,
    pub amount_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
}

/// Edit of a manual movement. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementPatch {
    pub kind: Option<MovementKind>,
    pub concept: Option<String>,
    pub amount_cents: Option<i64>,
    pub payment_method: Option<Option<PaymentMethod>>,
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    pub kind: Option<MovementKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// A named concept offered when recording a manual movement, e.g. "rent".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MovementConcept {
    pub id: String,
    pub owner_id: String,
    /// Unique per owner, case-insensitive.
    pub name: String,
    pub kind: MovementKind,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMovementConcept {
    pub name: String,
    pub kind: MovementKind,
}

// =============================================================================
// Membership Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MembershipType {
    pub id: String,
    pub owner_id: String,
    /// Unique per owner.
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub duration: DurationDescriptor,
    pub kind: MembershipKind,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MembershipType {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMembershipType {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub kind: MembershipKind,
    /// Defaults to the kind's natural length.
    pub duration: Option<DurationDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MembershipTypePatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub price_cents: Option<i64>,
    pub kind: Option<MembershipKind>,
    pub duration: Option<DurationDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MembershipTypeFilter {
    /// Substring matched against the name.
    pub search: Option<String>,
    pub kind: Option<MembershipKind>,
    /// `None` lists active and inactive types.
    pub is_active: Option<bool>,
}

// =============================================================================
// Members
// =============================================================================

/// A gym member (socio). Distinct from the accounts that operate the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Member {
    pub id: String,
    pub owner_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    /// The membership instance most recently assigned.
    pub active_membership_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMember {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberFilter {
    /// Substring matched against the full name and email.
    pub search: Option<String>,
    /// `None` lists enabled and disabled members.
    pub is_active: Option<bool>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl MemberFilter {
    pub fn active() -> Self {
        MemberFilter {
            is_active: Some(true),
            ..MemberFilter::default()
        }
    }

    pub fn search(query: impl Into<String>) -> Self {
        MemberFilter {
            search: Some(query.into()),
            ..MemberFilter::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
}

// =============================================================================
// Member Memberships
// =============================================================================

/// A membership instance bound to a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MemberMembership {
    pub id: String,
    pub owner_id: String,
    pub member_id: String,
    pub membership_type_id: String,
    pub start_date: NaiveDate,
    /// Computed once at assignment.
    pub end_date: NaiveDate,
    pub payment_status: PaymentStatus,
    /// The type's price when this instance was assigned.
    pub price_cents: i64,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberMembership {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        crate::membership::is_expired(self.end_date, today)
    }
}

/// Manual edit of a membership instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MembershipPatch {
    pub notes: Option<Option<String>>,
    /// Moving the start date shifts the end date by the same amount.
    pub start_date: Option<NaiveDate>,
}

// =============================================================================
// Paging
// =============================================================================

/// Offset pagination for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub const MAX_LIMIT: u32 = 500;

    pub fn new(limit: u32, offset: u32) -> Self {
        Page {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page {
            limit: 50,
            offset: 0,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(line_no: u32, qty: i64, unit: i64) -> SaleItem {
        SaleItem {
            sale_id: "s".to_string(),
            line_no,
            product_id: format!("p{line_no}"),
            code_snapshot: format!("C{line_no}"),
            name_snapshot: "Item".to_string(),
            quantity: qty,
            unit_price_cents: unit,
            subtotal_cents: qty * unit,
        }
    }

    #[test]
    fn test_sale_items_total() {
        let now = Utc::now();
        let sale = Sale {
            id: "s".to_string(),
            owner_id: "o".to_string(),
            number: "V-20240115-ABC123".to_string(),
            status: SaleStatus::Completed,
            total_cents: 35,
            payment_method: PaymentMethod::Cash,
            notes: None,
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
            cancelled_at: None,
            items: vec![item(1, 3, 10), item(2, 2, 5)],
        };
        assert_eq!(sale.items_total(), sale.total());
    }

    #[test]
    fn test_signed_movement_amount() {
        let movement = CashMovement {
            id: "m".to_string(),
            owner_id: "o".to_string(),
            kind: MovementKind::Expense,
            concept: "refund".to_string(),
            amount_cents: 3500,
            payment_method: Some(PaymentMethod::Cash),
            notes: None,
            reference_table: Some("sales".to_string()),
            reference_id: Some("s".to_string()),
            created_at: Utc::now(),
        };
        assert_eq!(movement.signed_amount().cents(), -3500);
    }

    #[test]
    fn test_sale_status_serialization() {
        let json = serde_json::to_string(&SaleStatus::Cancelling).unwrap();
        assert_eq!(json, "\"cancelling\"");
        assert_eq!(SaleStatus::Pending.to_string(), "pending");
        assert_eq!(SaleStatus::Reverting.as_str(), "reverting");
    }

    #[test]
    fn test_page_limit_clamped() {
        assert_eq!(Page::new(0, 0).limit, 1);
        assert_eq!(Page::new(10_000, 0).limit, Page::MAX_LIMIT);
        assert_eq!(Page::default().limit, 50);
    }
}
