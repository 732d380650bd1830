//! # gym-db: Persistence for the Gym Back Office
//!
//! Store traits the engine is written against, and their SQLite
//! implementation using sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  gym-engine (StockLedger, SaleProcessor, MembershipManager, ...)       │
//! │       │  Arc<dyn CatalogStore> ...                                     │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     gym-db (THIS CRATE)                         │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ impl store::* │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ ProductRepo   │    │ 001_initial  │  │   │
//! │  │   │               │    │ SaleRepo ...  │    │ 002_members  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (or :memory: in tests)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - Store traits (the persistence contract)
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - SQLite implementations of the store traits
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gym_db::{Database, DbConfig};
//! use gym_db::store::CatalogStore;
//!
//! let db = Database::new(DbConfig::new("gym.db")).await?;
//! let product = db.products().find_by_code(owner_id, "WATER-500").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use store::{
    CatalogStore, MemberStore, MembershipStore, MovementStore, SaleStore, SaleTransition,
    StockWrite, StockWriteRequest,
};

pub use repository::member::MemberRepository;
pub use repository::membership::MembershipRepository;
pub use repository::movement::MovementRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
