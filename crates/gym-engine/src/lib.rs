//! # gym-engine: Operations for the Gym Back Office
//!
//! Turns the store traits of `gym-db` and the pure rules of `gym-core` into
//! the operations callers use.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  apps/gym-worker ──► Engine                                             │
//! │                        ├── catalog      CatalogService                  │
//! │                        ├── sales        SaleProcessor ──► StockLedger   │
//! │                        ├── memberships  MembershipManager               │
//! │                        ├── members      MemberService                   │
//! │                        ├── movements    MovementService                 │
//! │                        └── reconciler   Reconciler                      │
//! │                               │                                         │
//! │                               ▼                                         │
//! │                 Arc<dyn CatalogStore>, Arc<dyn SaleStore>, ...          │
//! │                               │                                         │
//! │                               ▼                                         │
//! │                      gym-db SQLite repositories                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation takes the caller's `owner_id` and fails with `Forbidden`
//! on records of another owner. Background operations (sweep, reconcile)
//! act across owners.
//!
//! ## Example
//! ```rust,no_run
//! use gym_core::NewSaleItem;
//! use gym_db::{Database, DbConfig};
//! use gym_engine::{Engine, EngineConfig, NewSale};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DbConfig::new("./gym.db")).await?;
//! let engine = Engine::sqlite(&db, EngineConfig::default());
//!
//! let sale = engine
//!     .sales
//!     .create_sale("owner-1", NewSale::new(vec![NewSaleItem::new("product-id", 2, 1500)]))
//!     .await?;
//! println!("{} {}", sale.number, sale.total());
//! # Ok(())
//! # }
//! ```

mod call;

pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod members;
pub mod memberships;
pub mod movements;
pub mod reconcile;
pub mod sales;

use std::sync::Arc;

use gym_db::{CatalogStore, Database, MemberStore, MembershipStore, MovementStore, SaleStore};

pub use catalog::{CatalogService, DeleteOutcome};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ErrorCode};
pub use ledger::{DeltaOptions, StockChange, StockLedger};
pub use members::MemberService;
pub use memberships::{MembershipManager, SweepReport};
pub use movements::MovementService;
pub use reconcile::{ReconcileReport, Reconciler};
pub use sales::{NewSale, SaleProcessor};

/// The store handles an [`Engine`] is built from.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub sales: Arc<dyn SaleStore>,
    pub movements: Arc<dyn MovementStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub members: Arc<dyn MemberStore>,
}

impl Stores {
    /// SQLite repositories sharing one pool.
    pub fn sqlite(db: &Database) -> Self {
        Stores {
            catalog: Arc::new(db.products()),
            sales: Arc::new(db.sales()),
            movements: Arc::new(db.movements()),
            memberships: Arc::new(db.memberships()),
            members: Arc::new(db.members()),
        }
    }
}

/// All engine services over one set of stores.
#[derive(Clone)]
pub struct Engine {
    pub catalog: CatalogService,
    pub sales: SaleProcessor,
    pub memberships: MembershipManager,
    pub members: MemberService,
    pub movements: MovementService,
    pub reconciler: Reconciler,
    pub ledger: StockLedger,
}

impl Engine {
    pub fn new(stores: Stores, config: EngineConfig) -> Self {
        let sales = SaleProcessor::new(stores.catalog.clone(), stores.sales.clone(), config.clone());

        Engine {
            catalog: CatalogService::new(stores.catalog.clone(), config.clone()),
            reconciler: Reconciler::new(sales.clone()),
            sales,
            memberships: MembershipManager::new(
                stores.memberships.clone(),
                stores.members.clone(),
                config.clone(),
            ),
            members: MemberService::new(stores.members, stores.memberships, config.clone()),
            movements: MovementService::new(stores.movements, config.clone()),
            ledger: StockLedger::new(stores.catalog, config),
        }
    }

    pub fn sqlite(db: &Database, config: EngineConfig) -> Self {
        Engine::new(Stores::sqlite(db), config)
    }
}
