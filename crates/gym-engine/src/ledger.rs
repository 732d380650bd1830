//! # Stock Ledger
//!
//! The single way stock quantities change after a product is created.
//!
//! ## Apply-Delta Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply_delta(owner, product, delta, options)                            │
//! │       │                                                                 │
//! │       ├── key given and already journaled? ──► return recorded change   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─ attempt 1..=max_attempts ─────────────────────────────────────────┐ │
//! │  │  read product (version v)                                          │ │
//! │  │  plan_delta(quantity, threshold, delta, policy)                    │ │
//! │  │  apply_stock_write(expected_version = v, journal entry)            │ │
//! │  │     Applied       ──► done                                         │ │
//! │  │     DuplicateKey  ──► done (another caller got there first)        │ │
//! │  │     Conflict      ──► re-read and try again                        │ │
//! │  └────────────────────────────────────────────────────────────────────┘ │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ConcurrentModification                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each store call is bounded by `store_timeout`. A timed-out write
//! surfaces as `OutcomeUnknown`; re-issuing it with the same idempotency
//! key returns the recorded change instead of applying it twice. A key
//! recorded for another owner or product is refused, never replayed.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use gym_core::stock::plan_delta;
use gym_core::{
    new_id, DeltaPolicy, StockJournalEntry, StockReason, StockStatus, ValidationError,
};
use gym_db::{CatalogStore, StockWrite, StockWriteRequest};

use crate::call::{bounded, ensure_owner};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Options & Results
// =============================================================================

/// How a delta is applied and recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaOptions {
    pub policy: DeltaPolicy,
    pub idempotency_key: Option<String>,
    pub reason: StockReason,
    pub sale_id: Option<String>,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        DeltaOptions {
            policy: DeltaPolicy::Clamp,
            idempotency_key: None,
            reason: StockReason::Adjustment,
            sale_id: None,
        }
    }
}

impl DeltaOptions {
    /// Administrative adjustment: clamp at zero, no key.
    pub fn adjustment() -> Self {
        DeltaOptions::default()
    }

    /// A step of a sale's saga, journaled under `key`.
    pub fn for_sale(
        sale_id: impl Into<String>,
        key: impl Into<String>,
        reason: StockReason,
        policy: DeltaPolicy,
    ) -> Self {
        DeltaOptions {
            policy,
            idempotency_key: Some(key.into()),
            reason,
            sale_id: Some(sale_id.into()),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// What a delta did to a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockChange {
    pub product_id: String,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub new_status: StockStatus,
    pub requested_delta: i64,
    /// Differs from `requested_delta` only when the clamp policy kicked in.
    pub applied_delta: i64,
    /// True if the change was recorded by an earlier call with the same key.
    pub replayed: bool,
}

impl StockChange {
    fn from_entry(entry: &StockJournalEntry, replayed: bool) -> Self {
        StockChange {
            product_id: entry.product_id.clone(),
            previous_quantity: entry.previous_quantity,
            new_quantity: entry.new_quantity,
            new_status: entry.new_status,
            requested_delta: entry.requested_delta,
            applied_delta: entry.applied_delta,
            replayed,
        }
    }
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Clone)]
pub struct StockLedger {
    catalog: Arc<dyn CatalogStore>,
    config: EngineConfig,
}

impl StockLedger {
    pub fn new(catalog: Arc<dyn CatalogStore>, config: EngineConfig) -> Self {
        StockLedger { catalog, config }
    }

    /// Applies `delta` to a product's stock and journals it.
    ///
    /// ## Errors
    /// - `NotFound` if the product does not exist
    /// - `Forbidden` if it, or the entry already recorded under the key,
    ///   belongs to another owner
    /// - `ValidationError` if the key was recorded for another product
    /// - `InsufficientStock` under the strict policy when the delta would
    ///   take the quantity below zero (nothing is written)
    /// - `ConcurrentModification` after `max_attempts` lost races
    /// - `OutcomeUnknown` if a store call timed out
    pub async fn apply_delta(
        &self,
        owner_id: &str,
        product_id: &str,
        delta: i64,
        options: &DeltaOptions,
    ) -> EngineResult<StockChange> {
        let timeout = self.config.store_timeout;

        if let Some(key) = options.idempotency_key.as_deref() {
            let recorded = bounded(timeout, "journal_by_key", self.catalog.journal_by_key(key)).await?;
            if let Some(entry) = recorded {
                debug!(product_id, key, "Stock delta already journaled");
                return replay(&entry, owner_id, product_id);
            }
        }

        for attempt in 1..=self.config.max_attempts {
            let product = bounded(timeout, "get_product", self.catalog.get_product(product_id))
                .await?
                .ok_or_else(|| EngineError::not_found("Product", product_id))?;
            ensure_owner("Product", product_id, &product.owner_id, owner_id)?;

            let planned = plan_delta(
                product.stock_quantity,
                product.reorder_threshold,
                delta,
                options.policy,
            )
            .ok_or_else(|| EngineError::InsufficientStock {
                product_id: product.id.clone(),
                code: product.code.clone(),
                line_no: None,
                available: product.stock_quantity,
                requested: -delta,
            })?;

            let request = StockWriteRequest {
                product_id: product.id.clone(),
                expected_version: product.version,
                new_quantity: planned.new_quantity,
                new_status: planned.new_status,
                journal: StockJournalEntry {
                    id: new_id(),
                    product_id: product.id.clone(),
                    owner_id: product.owner_id.clone(),
                    idempotency_key: options.idempotency_key.clone(),
                    requested_delta: delta,
                    applied_delta: planned.applied_delta,
                    previous_quantity: product.stock_quantity,
                    new_quantity: planned.new_quantity,
                    new_status: planned.new_status,
                    sale_id: options.sale_id.clone(),
                    reason: options.reason,
                    created_at: Utc::now(),
                },
            };

            match bounded(timeout, "apply_stock_write", self.catalog.apply_stock_write(&request))
                .await?
            {
                StockWrite::Applied(entry) => {
                    info!(
                        product_id,
                        reason = ?entry.reason,
                        requested = entry.requested_delta,
                        applied = entry.applied_delta,
                        quantity = entry.new_quantity,
                        status = %entry.new_status,
                        "Stock delta applied"
                    );
                    return Ok(StockChange::from_entry(&entry, false));
                }
                StockWrite::DuplicateKey(entry) => {
                    debug!(product_id, "Stock delta journaled by a concurrent caller");
                    return replay(&entry, owner_id, product_id);
                }
                StockWrite::Conflict => {
                    warn!(
                        product_id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        "Stock write lost a race, retrying"
                    );
                    tokio::task::yield_now().await;
                }
            }
        }

        Err(EngineError::ConcurrentModification {
            entity: "Product".to_string(),
            id: product_id.to_string(),
            attempts: self.config.max_attempts,
        })
    }

    /// Administrative stock adjustment (clamp policy).
    pub async fn adjust_stock(
        &self,
        owner_id: &str,
        product_id: &str,
        delta: i64,
    ) -> EngineResult<StockChange> {
        self.apply_delta(owner_id, product_id, delta, &DeltaOptions::adjustment())
            .await
    }
}

/// The recorded change for a key, as long as it was recorded for this owner
/// and product.
fn replay(entry: &StockJournalEntry, owner_id: &str, product_id: &str) -> EngineResult<StockChange> {
    let key = entry.idempotency_key.as_deref().unwrap_or_default();
    if entry.owner_id != owner_id {
        warn!(key, product_id, "Idempotency key belongs to another owner");
        return Err(EngineError::forbidden("StockJournalEntry", key));
    }
    if entry.product_id != product_id {
        warn!(key, product_id, recorded = %entry.product_id, "Idempotency key reused for another product");
        return Err(EngineError::Validation(ValidationError::InvalidFormat {
            field: "idempotency_key".to_string(),
            reason: format!("already used for product {}", entry.product_id),
        }));
    }
    Ok(StockChange::from_entry(entry, true))
}
