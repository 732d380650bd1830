//! # Store Traits
//!
//! The persistence contract the engine is written against. The engine never
//! sees SQL; it only needs point reads and writes, compare-and-swap on a
//! version or status, and a few indexed queries.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  gym-engine                                                             │
//! │     │  Arc<dyn CatalogStore>, Arc<dyn SaleStore>, ...                  │
//! │     ▼                                                                   │
//! │  store traits (THIS MODULE)                                            │
//! │     │                                                                   │
//! │     ├── repository::product    impl CatalogStore                       │
//! │     ├── repository::sale       impl SaleStore                          │
//! │     ├── repository::movement   impl MovementStore                      │
//! │     ├── repository::membership impl MembershipStore                    │
//! │     └── repository::member     impl MemberStore                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Conditional writes return `bool` (or [`StockWrite`]): `false` means the
//! precondition no longer held and nothing was written.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use gym_core::{
    CashMovement, Member, MemberFilter, MemberMembership, MembershipType, MembershipTypeFilter,
    MovementConcept, MovementFilter, MovementKind, Page, Product, ProductFilter, Sale, SaleFilter,
    SaleStatus, StockJournalEntry, StockStatus,
};

use crate::error::DbResult;

// =============================================================================
// Catalog
// =============================================================================

/// A conditional stock write together with the journal entry recording it.
#[derive(Debug, Clone)]
pub struct StockWriteRequest {
    pub product_id: String,
    /// The write succeeds only if the product's version still equals this.
    pub expected_version: i64,
    pub new_quantity: i64,
    pub new_status: StockStatus,
    pub journal: StockJournalEntry,
}

/// Result of [`CatalogStore::apply_stock_write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockWrite {
    /// Product updated and journal entry inserted.
    Applied(StockJournalEntry),
    /// The product changed since it was read. Nothing was written.
    Conflict,
    /// The idempotency key was already journaled. Nothing was written; the
    /// earlier entry is returned.
    DuplicateKey(StockJournalEntry),
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_product(&self, id: &str) -> DbResult<Option<Product>>;

    async fn put_product(&self, product: &Product) -> DbResult<()>;

    /// Replaces the product if its stored version equals `expected_version`.
    /// The stored version becomes `expected_version + 1`.
    async fn update_product(&self, product: &Product, expected_version: i64) -> DbResult<bool>;

    async fn find_by_code(&self, owner_id: &str, code: &str) -> DbResult<Option<Product>>;

    /// Conditional quantity/status write plus journal insert, atomically.
    async fn apply_stock_write(&self, request: &StockWriteRequest) -> DbResult<StockWrite>;

    async fn journal_for_sale(&self, sale_id: &str) -> DbResult<Vec<StockJournalEntry>>;

    async fn journal_by_key(&self, key: &str) -> DbResult<Option<StockJournalEntry>>;

    async fn journal_for_product(
        &self,
        product_id: &str,
        page: Page,
    ) -> DbResult<Vec<StockJournalEntry>>;

    async fn is_referenced_by_sale(&self, product_id: &str) -> DbResult<bool>;

    /// Hard delete. Returns `false` if no row was removed.
    async fn delete_product(&self, id: &str) -> DbResult<bool>;

    async fn list_products(
        &self,
        owner_id: &str,
        filter: &ProductFilter,
        page: Page,
    ) -> DbResult<Vec<Product>>;
}

// =============================================================================
// Sales
// =============================================================================

/// A compare-and-swap on a sale's status, optionally recording a cash
/// movement in the same atomic step.
#[derive(Debug, Clone)]
pub struct SaleTransition {
    pub sale_id: String,
    pub from: SaleStatus,
    pub to: SaleStatus,
    pub at: DateTime<Utc>,
    /// Inserted unless a movement with the same reference and kind exists.
    pub movement: Option<CashMovement>,
}

#[async_trait]
pub trait SaleStore: Send + Sync {
    /// Inserts the sale header and its line items in one transaction.
    async fn insert_sale(&self, sale: &Sale) -> DbResult<()>;

    /// Loads a sale with its items ordered by line number.
    async fn get_sale(&self, id: &str) -> DbResult<Option<Sale>>;

    /// Applies the transition if the sale is still in `from`.
    ///
    /// Stamps `completed_at` when moving to completed and `cancelled_at`
    /// when moving to cancelled.
    async fn transition_sale(&self, transition: &SaleTransition) -> DbResult<bool>;

    async fn update_sale_notes(
        &self,
        id: &str,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<bool>;

    async fn list_sales(&self, owner_id: &str, filter: &SaleFilter, page: Page)
        -> DbResult<Vec<Sale>>;

    /// Sales of any owner sitting in `status` whose last update is older
    /// than `before`. Items are loaded.
    async fn stale_sales(
        &self,
        status: SaleStatus,
        before: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<Sale>>;
}

// =============================================================================
// Cash Movements
// =============================================================================

#[async_trait]
pub trait MovementStore: Send + Sync {
    async fn insert_movement(&self, movement: &CashMovement) -> DbResult<()>;

    async fn list_movements(
        &self,
        owner_id: &str,
        filter: &MovementFilter,
        page: Page,
    ) -> DbResult<Vec<CashMovement>>;

    async fn movements_for_reference(
        &self,
        reference_table: &str,
        reference_id: &str,
    ) -> DbResult<Vec<CashMovement>>;

    async fn get_movement(&self, id: &str) -> DbResult<Option<CashMovement>>;

    /// Overwrites kind, concept, amount, payment method and notes.
    async fn update_movement(&self, movement: &CashMovement) -> DbResult<bool>;

    async fn delete_movement(&self, id: &str) -> DbResult<bool>;

    async fn insert_concept(&self, concept: &MovementConcept) -> DbResult<()>;

    /// Active concepts of an owner ordered by name, optionally of one kind.
    async fn list_concepts(
        &self,
        owner_id: &str,
        kind: Option<MovementKind>,
    ) -> DbResult<Vec<MovementConcept>>;
}

// =============================================================================
// Memberships
// =============================================================================

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn get_type(&self, id: &str) -> DbResult<Option<MembershipType>>;

    /// Case-insensitive lookup.
    async fn find_type_by_name(&self, owner_id: &str, name: &str)
        -> DbResult<Option<MembershipType>>;

    async fn insert_type(&self, membership_type: &MembershipType) -> DbResult<()>;

    async fn update_type(&self, membership_type: &MembershipType) -> DbResult<bool>;

    async fn list_types(
        &self,
        owner_id: &str,
        filter: &MembershipTypeFilter,
    ) -> DbResult<Vec<MembershipType>>;

    async fn get_membership(&self, id: &str) -> DbResult<Option<MemberMembership>>;

    /// Inserts the instance and points the member's back-reference at it,
    /// in one transaction. Returns `false` if the member row is gone.
    async fn assign_membership(&self, membership: &MemberMembership) -> DbResult<bool>;

    /// Overwrites notes, dates and `updated_at`.
    async fn update_membership(&self, membership: &MemberMembership) -> DbResult<bool>;

    /// unpaid → paid. Returns `false` if the instance was not unpaid.
    async fn mark_paid(&self, id: &str, at: DateTime<Utc>) -> DbResult<bool>;

    /// paid → unpaid. Returns `false` if the instance was not paid.
    async fn mark_expired(&self, id: &str, at: DateTime<Utc>) -> DbResult<bool>;

    /// Deletes the instance and clears any back-reference to it.
    async fn delete_membership(&self, id: &str) -> DbResult<bool>;

    /// Paid instances of any owner whose end date is before `today`, in
    /// `(end_date, id)` order, starting strictly after `after`.
    async fn expired_paid(
        &self,
        today: NaiveDate,
        after: Option<(NaiveDate, &str)>,
        limit: u32,
    ) -> DbResult<Vec<MemberMembership>>;

    async fn memberships_for_member(&self, member_id: &str) -> DbResult<Vec<MemberMembership>>;
}

// =============================================================================
// Members
// =============================================================================

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn get_member(&self, id: &str) -> DbResult<Option<Member>>;

    async fn insert_member(&self, member: &Member) -> DbResult<()>;

    /// Overwrites profile fields and `is_active`. The back-reference is
    /// owned by [`MembershipStore`] and left untouched.
    async fn update_member(&self, member: &Member) -> DbResult<bool>;

    /// Deletes the member and all of their membership instances.
    async fn delete_member(&self, id: &str) -> DbResult<bool>;

    /// Ordered by last name, then first name.
    async fn list_members(
        &self,
        owner_id: &str,
        filter: &MemberFilter,
        page: Page,
    ) -> DbResult<Vec<Member>>;

    async fn count_members(&self, owner_id: &str, filter: &MemberFilter) -> DbResult<u64>;

    /// Members created in `[from, to)`, newest first.
    async fn members_created_between(
        &self,
        owner_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<Member>>;
}
