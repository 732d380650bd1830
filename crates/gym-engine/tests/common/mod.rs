//! Shared fixtures: an in-memory database, an engine over it, and store
//! wrappers that inject failures into stock writes and membership expiry,
//! or hold a sale transition until the test lets it through.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Notify;

use gym_core::{
    MemberMembership, MembershipKind, MembershipType, MembershipTypeFilter, Member, NewMember,
    NewMembershipType, NewProduct, Page, Product, ProductFilter, Sale, SaleFilter, SaleStatus,
    StockJournalEntry,
};
use gym_db::{
    CatalogStore, Database, DbConfig, DbError, DbResult, MembershipRepository, MembershipStore,
    ProductRepository, SaleRepository, SaleStore, SaleTransition, StockWrite, StockWriteRequest,
};
use gym_engine::{Engine, EngineConfig, Stores};

pub const OWNER: &str = "owner-a";
pub const OTHER_OWNER: &str = "owner-b";

pub async fn database() -> Database {
    Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database")
}

pub fn test_config() -> EngineConfig {
    EngineConfig::default().store_timeout(Duration::from_millis(500))
}

pub async fn setup() -> (Database, Engine) {
    let db = database().await;
    let engine = Engine::sqlite(&db, test_config());
    (db, engine)
}

/// Engine whose catalog store goes through a [`FaultyCatalog`].
pub async fn setup_with_faults() -> (Database, Engine, Arc<FaultyCatalog>) {
    let db = database().await;
    let faulty = Arc::new(FaultyCatalog::new(db.products()));
    let mut stores = Stores::sqlite(&db);
    stores.catalog = faulty.clone();
    let engine = Engine::new(stores, test_config());
    (db, engine, faulty)
}

/// Engine whose membership store goes through a [`FaultyMemberships`].
pub async fn setup_with_membership_faults(
    config: EngineConfig,
) -> (Database, Engine, Arc<FaultyMemberships>) {
    let db = database().await;
    let faulty = Arc::new(FaultyMemberships::new(db.memberships()));
    let mut stores = Stores::sqlite(&db);
    stores.memberships = faulty.clone();
    let engine = Engine::new(stores, config);
    (db, engine, faulty)
}

/// Engine whose sale store goes through a [`GatedSales`].
pub async fn setup_with_gate() -> (Database, Engine, Arc<GatedSales>) {
    let db = database().await;
    let gated = Arc::new(GatedSales::new(db.sales()));
    let mut stores = Stores::sqlite(&db);
    stores.sales = gated.clone();
    let engine = Engine::new(stores, test_config().store_timeout(Duration::from_secs(5)));
    (db, engine, gated)
}

pub async fn product(engine: &Engine, code: &str, stock: i64, price_cents: i64) -> Product {
    engine
        .catalog
        .create_product(
            OWNER,
            NewProduct {
                code: code.to_string(),
                name: format!("{code} item"),
                price_cents,
                cost_cents: price_cents / 2,
                stock_quantity: stock,
                reorder_threshold: Some(5),
                ..NewProduct::default()
            },
        )
        .await
        .expect("create product")
}

pub async fn stock_of(engine: &Engine, product_id: &str) -> i64 {
    engine
        .catalog
        .get_product(OWNER, product_id)
        .await
        .expect("product")
        .stock_quantity
}

pub async fn member(engine: &Engine, first_name: &str) -> Member {
    engine
        .members
        .create_member(
            OWNER,
            NewMember {
                first_name: first_name.to_string(),
                last_name: "Tester".to_string(),
                ..NewMember::default()
            },
        )
        .await
        .expect("create member")
}

pub async fn monthly_type(engine: &Engine, name: &str) -> MembershipType {
    engine
        .memberships
        .create_type(
            OWNER,
            NewMembershipType {
                name: name.to_string(),
                description: None,
                price_cents: 60000,
                kind: MembershipKind::Monthly,
                duration: None,
            },
        )
        .await
        .expect("create membership type")
}

// =============================================================================
// Fault Injection
// =============================================================================

#[derive(Debug, Clone)]
pub enum Fault {
    /// Stock writes whose idempotency key ends with the suffix fail.
    FailWrite { key_suffix: String },
    /// Stock writes whose key ends with the suffix land, then the response
    /// is held back for `delay`.
    SlowWrite { key_suffix: String, delay: Duration },
    /// Every stock write reports a version conflict.
    AlwaysConflict,
}

pub struct FaultyCatalog {
    inner: ProductRepository,
    faults: Mutex<Vec<Fault>>,
    conflicts: Mutex<u32>,
}

impl FaultyCatalog {
    pub fn new(inner: ProductRepository) -> Self {
        FaultyCatalog {
            inner,
            faults: Mutex::new(Vec::new()),
            conflicts: Mutex::new(0),
        }
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().unwrap().push(fault);
    }

    pub fn clear(&self) {
        self.faults.lock().unwrap().clear();
    }

    pub fn conflicts_reported(&self) -> u32 {
        *self.conflicts.lock().unwrap()
    }

    fn matching(&self, key: Option<&str>) -> Option<Fault> {
        let faults = self.faults.lock().unwrap();
        faults
            .iter()
            .find(|fault| match fault {
                Fault::FailWrite { key_suffix } | Fault::SlowWrite { key_suffix, .. } => {
                    key.is_some_and(|k| k.ends_with(key_suffix.as_str()))
                }
                Fault::AlwaysConflict => true,
            })
            .cloned()
    }
}

#[async_trait]
impl CatalogStore for FaultyCatalog {
    async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        self.inner.get_product(id).await
    }

    async fn put_product(&self, product: &Product) -> DbResult<()> {
        self.inner.put_product(product).await
    }

    async fn update_product(&self, product: &Product, expected_version: i64) -> DbResult<bool> {
        self.inner.update_product(product, expected_version).await
    }

    async fn find_by_code(&self, owner_id: &str, code: &str) -> DbResult<Option<Product>> {
        self.inner.find_by_code(owner_id, code).await
    }

    async fn apply_stock_write(&self, request: &StockWriteRequest) -> DbResult<StockWrite> {
        match self.matching(request.journal.idempotency_key.as_deref()) {
            Some(Fault::FailWrite { key_suffix }) => {
                Err(DbError::QueryFailed(format!("injected failure for *{key_suffix}")))
            }
            Some(Fault::SlowWrite { delay, .. }) => {
                let result = self.inner.apply_stock_write(request).await;
                tokio::time::sleep(delay).await;
                result
            }
            Some(Fault::AlwaysConflict) => {
                *self.conflicts.lock().unwrap() += 1;
                Ok(StockWrite::Conflict)
            }
            None => self.inner.apply_stock_write(request).await,
        }
    }

    async fn journal_for_sale(&self, sale_id: &str) -> DbResult<Vec<StockJournalEntry>> {
        self.inner.journal_for_sale(sale_id).await
    }

    async fn journal_by_key(&self, key: &str) -> DbResult<Option<StockJournalEntry>> {
        self.inner.journal_by_key(key).await
    }

    async fn journal_for_product(
        &self,
        product_id: &str,
        page: Page,
    ) -> DbResult<Vec<StockJournalEntry>> {
        self.inner.journal_for_product(product_id, page).await
    }

    async fn is_referenced_by_sale(&self, product_id: &str) -> DbResult<bool> {
        self.inner.is_referenced_by_sale(product_id).await
    }

    async fn delete_product(&self, id: &str) -> DbResult<bool> {
        self.inner.delete_product(id).await
    }

    async fn list_products(
        &self,
        owner_id: &str,
        filter: &ProductFilter,
        page: Page,
    ) -> DbResult<Vec<Product>> {
        self.inner.list_products(owner_id, filter, page).await
    }
}

/// Fails `mark_expired` for chosen membership ids.
pub struct FaultyMemberships {
    inner: MembershipRepository,
    failing: Mutex<HashSet<String>>,
}

impl FaultyMemberships {
    pub fn new(inner: MembershipRepository) -> Self {
        FaultyMemberships {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_expiry(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }
}

#[async_trait]
impl MembershipStore for FaultyMemberships {
    async fn get_type(&self, id: &str) -> DbResult<Option<MembershipType>> {
        self.inner.get_type(id).await
    }

    async fn find_type_by_name(
        &self,
        owner_id: &str,
        name: &str,
    ) -> DbResult<Option<MembershipType>> {
        self.inner.find_type_by_name(owner_id, name).await
    }

    async fn insert_type(&self, membership_type: &MembershipType) -> DbResult<()> {
        self.inner.insert_type(membership_type).await
    }

    async fn update_type(&self, membership_type: &MembershipType) -> DbResult<bool> {
        self.inner.update_type(membership_type).await
    }

    async fn list_types(
        &self,
        owner_id: &str,
        filter: &MembershipTypeFilter,
    ) -> DbResult<Vec<MembershipType>> {
        self.inner.list_types(owner_id, filter).await
    }

    async fn get_membership(&self, id: &str) -> DbResult<Option<MemberMembership>> {
        self.inner.get_membership(id).await
    }

    async fn assign_membership(&self, membership: &MemberMembership) -> DbResult<bool> {
        self.inner.assign_membership(membership).await
    }

    async fn update_membership(&self, membership: &MemberMembership) -> DbResult<bool> {
        self.inner.update_membership(membership).await
    }

    async fn mark_paid(&self, id: &str, at: DateTime<Utc>) -> DbResult<bool> {
        self.inner.mark_paid(id, at).await
    }

    async fn mark_expired(&self, id: &str, at: DateTime<Utc>) -> DbResult<bool> {
        if self.failing.lock().unwrap().contains(id) {
            return Err(DbError::QueryFailed(format!("injected expiry failure for {id}")));
        }
        self.inner.mark_expired(id, at).await
    }

    async fn delete_membership(&self, id: &str) -> DbResult<bool> {
        self.inner.delete_membership(id).await
    }

    async fn expired_paid(
        &self,
        today: NaiveDate,
        after: Option<(NaiveDate, &str)>,
        limit: u32,
    ) -> DbResult<Vec<MemberMembership>> {
        self.inner.expired_paid(today, after, limit).await
    }

    async fn memberships_for_member(&self, member_id: &str) -> DbResult<Vec<MemberMembership>> {
        self.inner.memberships_for_member(member_id).await
    }
}

/// Holds the first pending → reverting write until [`GatedSales::release`].
pub struct GatedSales {
    inner: SaleRepository,
    armed: AtomicBool,
    reached: Notify,
    resume: Notify,
}

impl GatedSales {
    pub fn new(inner: SaleRepository) -> Self {
        GatedSales {
            inner,
            armed: AtomicBool::new(false),
            reached: Notify::new(),
            resume: Notify::new(),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held transition is waiting.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.resume.notify_one();
    }
}

#[async_trait]
impl SaleStore for GatedSales {
    async fn insert_sale(&self, sale: &Sale) -> DbResult<()> {
        self.inner.insert_sale(sale).await
    }

    async fn get_sale(&self, id: &str) -> DbResult<Option<Sale>> {
        self.inner.get_sale(id).await
    }

    async fn transition_sale(&self, transition: &SaleTransition) -> DbResult<bool> {
        let claim = transition.from == SaleStatus::Pending && transition.to == SaleStatus::Reverting;
        if claim && self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.resume.notified().await;
        }
        self.inner.transition_sale(transition).await
    }

    async fn update_sale_notes(
        &self,
        id: &str,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        self.inner.update_sale_notes(id, notes, at).await
    }

    async fn list_sales(
        &self,
        owner_id: &str,
        filter: &SaleFilter,
        page: Page,
    ) -> DbResult<Vec<Sale>> {
        self.inner.list_sales(owner_id, filter, page).await
    }

    async fn stale_sales(
        &self,
        status: SaleStatus,
        before: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<Sale>> {
        self.inner.stale_sales(status, before, limit).await
    }
}
