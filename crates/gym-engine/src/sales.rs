//! # Sale Processor
//!
//! Creates and cancels sales as small sagas over the stock ledger.
//!
//! ## Create
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. validate lines               (nothing written)                      │
//! │  2. load products, owner check   (nothing written)                      │
//! │  3. SalePlan::build              all-or-nothing stock check + totals    │
//! │  4. insert sale  ─────────────── status = pending                       │
//! │  5. per line: apply_delta(-q)    strict, key "{sale}:{line}:sale"       │
//! │        │                                                                │
//! │        ├── all applied ──► pending → completed + income movement        │
//! │        │                                                                │
//! │        └── a line failed ──► claim: pending → reverting                 │
//! │                              reverse journaled lines ("...:reversal")   │
//! │                              reverting → cancelled, return the failure  │
//! │                              (reversal failed? stays reverting for the  │
//! │                               reconciler)                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rolling back always starts with the pending → reverting claim. The
//! creator's pending → completed write and the claim are both conditional on
//! `pending`, so exactly one of them lands.
//!
//! ## Cancel
//! ```text
//! completed ──CAS──► cancelling ──restore lines ("...:cancel")──► cancelled
//!                                                                + expense
//! ```
//! A cancel that finds the sale already in `cancelling` resumes from the
//! restore step. Restores use the journaled applied delta of each line, so
//! a cancelled sale gives back exactly what it took.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use gym_core::sale::{cancel_key, reversal_key, sale_line_key, sale_number};
use gym_core::validation::validate_notes;
use gym_core::{
    new_id, CashMovement, DeltaPolicy, MovementKind, NewSaleItem, Page, PaymentMethod, Product,
    Sale, SaleFilter, SalePlan, SaleStatus, StockJournalEntry, StockReason,
};
use gym_db::{CatalogStore, SaleStore, SaleTransition};

use crate::call::{bounded, ensure_owner};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{DeltaOptions, StockChange, StockLedger};

/// `reference_table` of movements recorded by sales.
pub const SALES_REFERENCE: &str = "sales";

/// Movement concept for a completed sale.
pub const SALE_CONCEPT: &str = "sale";

/// Movement concept for a cancelled sale.
pub const REFUND_CONCEPT: &str = "refund";

/// A sale request.
#[derive(Debug, Clone, Default)]
pub struct NewSale {
    pub items: Vec<NewSaleItem>,
    pub notes: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

impl NewSale {
    pub fn new(items: Vec<NewSaleItem>) -> Self {
        NewSale {
            items,
            ..NewSale::default()
        }
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }
}

/// How [`SaleProcessor::roll_back`] left a pending sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RollBack {
    /// This call claimed the sale and cancelled it.
    Cancelled,
    /// Another caller had claimed or cancelled it; reversals were re-issued.
    Joined,
    /// The sale was no longer pending and not being rolled back.
    Lost(SaleStatus),
}

#[derive(Clone)]
pub struct SaleProcessor {
    catalog: Arc<dyn CatalogStore>,
    sales: Arc<dyn SaleStore>,
    ledger: StockLedger,
    config: EngineConfig,
}

impl SaleProcessor {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        sales: Arc<dyn SaleStore>,
        config: EngineConfig,
    ) -> Self {
        let ledger = StockLedger::new(catalog.clone(), config.clone());
        SaleProcessor {
            catalog,
            sales,
            ledger,
            config,
        }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Records a sale and takes its stock.
    ///
    /// Returns the completed sale. On any failure after the sale row was
    /// written, the stock already taken is given back and the sale ends up
    /// cancelled (or reverting, if giving it back also failed).
    pub async fn create_sale(&self, owner_id: &str, request: NewSale) -> EngineResult<Sale> {
        let timeout = self.config.store_timeout;

        gym_core::sale::validate_items(&request.items)?;
        let notes = normalize_notes(request.notes.as_deref());
        validate_notes(notes.as_deref())?;

        let products = self.load_products(owner_id, &request.items).await?;

        let sale_id = new_id();
        let plan = SalePlan::build(&sale_id, &request.items, &products)?;

        let now = Utc::now();
        let sale = Sale {
            id: sale_id.clone(),
            owner_id: owner_id.to_string(),
            number: sale_number(now.date_naive(), &sale_id),
            status: SaleStatus::Pending,
            total_cents: plan.total.cents(),
            payment_method: request.payment_method.unwrap_or_default(),
            notes,
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
            items: plan.items.clone(),
        };
        bounded(timeout, "insert_sale", self.sales.insert_sale(&sale)).await?;
        debug!(sale_id = %sale.id, number = %sale.number, total = sale.total_cents, "Sale pending");

        let mut applied: Vec<StockChange> = Vec::with_capacity(plan.items.len());
        for decrement in plan.decrements() {
            let options = DeltaOptions::for_sale(
                &sale.id,
                sale_line_key(&sale.id, decrement.line_no),
                StockReason::Sale,
                DeltaPolicy::Strict,
            );
            match self
                .ledger
                .apply_delta(owner_id, &decrement.product_id, decrement.delta(), &options)
                .await
            {
                Ok(change) => applied.push(change),
                Err(err) => {
                    let err = attach_line(err, decrement.line_no);
                    self.compensate(&sale, &applied, &err).await;
                    return Err(err);
                }
            }
        }

        let completed = self.complete(&sale, Utc::now()).await?;
        if !completed {
            // The reconciler settled or claimed the sale while it was
            // pending. Lines taken after its journal read are given back here.
            let current = self.require_sale(&sale.id).await?;
            match current.status {
                SaleStatus::Completed => return Ok(current),
                SaleStatus::Reverting | SaleStatus::Cancelled => {
                    warn!(sale_id = %sale.id, status = %current.status, "Sale rolled back before it could complete");
                    self.reverse_decrements(&current).await?;
                }
                _ => {}
            }
            return Err(EngineError::InvalidSaleStatus {
                sale_id: current.id,
                current: current.status,
            });
        }

        info!(
            sale_id = %sale.id,
            number = %sale.number,
            lines = sale.items.len(),
            total = sale.total_cents,
            "Sale completed"
        );
        self.require_sale(&sale.id).await
    }

    async fn load_products(
        &self,
        owner_id: &str,
        items: &[NewSaleItem],
    ) -> EngineResult<HashMap<String, Product>> {
        let mut products = HashMap::new();
        for item in items {
            if products.contains_key(&item.product_id) {
                continue;
            }
            let product = bounded(
                self.config.store_timeout,
                "get_product",
                self.catalog.get_product(&item.product_id),
            )
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| EngineError::not_found("Product", &item.product_id))?;
            ensure_owner("Product", &product.id, &product.owner_id, owner_id)?;
            products.insert(product.id.clone(), product);
        }
        Ok(products)
    }

    /// pending → completed, recording the income movement in the same step.
    pub(crate) async fn complete(&self, sale: &Sale, at: DateTime<Utc>) -> EngineResult<bool> {
        let transition = SaleTransition {
            sale_id: sale.id.clone(),
            from: SaleStatus::Pending,
            to: SaleStatus::Completed,
            at,
            movement: Some(sale_movement(sale, MovementKind::Income, at)),
        };
        bounded(
            self.config.store_timeout,
            "transition_sale",
            self.sales.transition_sale(&transition),
        )
        .await
    }

    async fn compensate(&self, sale: &Sale, applied: &[StockChange], cause: &EngineError) {
        let product_ids: Vec<&str> = applied.iter().map(|c| c.product_id.as_str()).collect();
        let deltas: Vec<i64> = applied.iter().map(|c| c.applied_delta).collect();

        match self.roll_back(sale).await {
            Ok(RollBack::Lost(status)) => error!(
                sale_id = %sale.id,
                ?product_ids,
                ?deltas,
                cause = %cause,
                %status,
                "Sale failed part-way but was settled elsewhere; stock left as is"
            ),
            Ok(_) => error!(
                sale_id = %sale.id,
                ?product_ids,
                ?deltas,
                cause = %cause,
                "Sale failed part-way; stock restored and sale cancelled"
            ),
            Err(err) => error!(
                sale_id = %sale.id,
                ?product_ids,
                ?deltas,
                cause = %cause,
                error = %err,
                "Sale compensation failed; left reverting for reconciliation"
            ),
        }
    }

    /// Claims a pending sale (pending → reverting), gives back every
    /// journaled decrement and finalizes it as cancelled.
    ///
    /// If someone else already claimed or cancelled the sale, the reversals
    /// are re-issued under the same keys. If the sale left pending any
    /// other way (it completed), no stock is touched.
    pub(crate) async fn roll_back(&self, sale: &Sale) -> EngineResult<RollBack> {
        let claim = SaleTransition {
            sale_id: sale.id.clone(),
            from: SaleStatus::Pending,
            to: SaleStatus::Reverting,
            at: Utc::now(),
            movement: None,
        };
        let claimed = bounded(
            self.config.store_timeout,
            "transition_sale",
            self.sales.transition_sale(&claim),
        )
        .await?;

        if !claimed {
            let current = self.require_sale(&sale.id).await?;
            return match current.status {
                SaleStatus::Reverting | SaleStatus::Cancelled => {
                    self.finish_reversal(&current).await?;
                    Ok(RollBack::Joined)
                }
                status => Ok(RollBack::Lost(status)),
            };
        }

        debug!(sale_id = %sale.id, "Sale claimed for reversal");
        self.finish_reversal(sale).await?;
        Ok(RollBack::Cancelled)
    }

    /// Gives back the decrements of a claimed sale and moves
    /// reverting → cancelled, with no movement. Safe to run any number of
    /// times.
    pub(crate) async fn finish_reversal(&self, sale: &Sale) -> EngineResult<()> {
        self.reverse_decrements(sale).await?;

        let transition = SaleTransition {
            sale_id: sale.id.clone(),
            from: SaleStatus::Reverting,
            to: SaleStatus::Cancelled,
            at: Utc::now(),
            movement: None,
        };
        let finalized = bounded(
            self.config.store_timeout,
            "transition_sale",
            self.sales.transition_sale(&transition),
        )
        .await?;
        if !finalized {
            debug!(sale_id = %sale.id, "Reversal already finalized");
        }
        Ok(())
    }

    /// Gives back every journaled decrement of a sale that never completed.
    ///
    /// Returns the reversals applied (or replayed) in line order.
    pub(crate) async fn reverse_decrements(&self, sale: &Sale) -> EngineResult<Vec<StockChange>> {
        let journal = self.sale_journal(&sale.id).await?;
        let mut reversed = Vec::new();

        for item in &sale.items {
            let Some(entry) = journal.get(&sale_line_key(&sale.id, item.line_no)) else {
                continue;
            };
            if entry.applied_delta == 0 {
                continue;
            }
            let options = DeltaOptions::for_sale(
                &sale.id,
                reversal_key(&sale.id, item.line_no),
                StockReason::SaleReversal,
                DeltaPolicy::Clamp,
            );
            let change = self
                .ledger
                .apply_delta(&sale.owner_id, &entry.product_id, -entry.applied_delta, &options)
                .await?;
            reversed.push(change);
        }

        Ok(reversed)
    }

    /// The sale's stock journal keyed by idempotency key.
    pub(crate) async fn sale_journal(
        &self,
        sale_id: &str,
    ) -> EngineResult<HashMap<String, StockJournalEntry>> {
        let entries = bounded(
            self.config.store_timeout,
            "journal_for_sale",
            self.catalog.journal_for_sale(sale_id),
        )
        .await?;

        Ok(entries
            .into_iter()
            .filter_map(|e| e.idempotency_key.clone().map(|k| (k, e)))
            .collect())
    }

    // =========================================================================
    // Cancel
    // =========================================================================

    /// Cancels a completed sale and restores its stock.
    ///
    /// Cancelling an already cancelled sale returns it unchanged. A pending
    /// or reverting sale cannot be cancelled; it is settled by its creator or
    /// the reconciler.
    pub async fn cancel_sale(&self, owner_id: &str, sale_id: &str) -> EngineResult<Sale> {
        let sale = self.owned_sale(owner_id, sale_id).await?;

        match sale.status {
            SaleStatus::Cancelled => {
                debug!(sale_id, "Sale already cancelled");
                return Ok(sale);
            }
            SaleStatus::Pending | SaleStatus::Reverting => {
                return Err(EngineError::InvalidSaleStatus {
                    sale_id: sale.id,
                    current: sale.status,
                });
            }
            SaleStatus::Completed => {
                let transition = SaleTransition {
                    sale_id: sale.id.clone(),
                    from: SaleStatus::Completed,
                    to: SaleStatus::Cancelling,
                    at: Utc::now(),
                    movement: None,
                };
                let won = bounded(
                    self.config.store_timeout,
                    "transition_sale",
                    self.sales.transition_sale(&transition),
                )
                .await?;
                if !won {
                    let current = self.require_sale(sale_id).await?;
                    match current.status {
                        SaleStatus::Cancelled => return Ok(current),
                        SaleStatus::Cancelling => {}
                        status => {
                            return Err(EngineError::InvalidSaleStatus {
                                sale_id: current.id,
                                current: status,
                            })
                        }
                    }
                }
                info!(sale_id, "Sale cancelling");
            }
            SaleStatus::Cancelling => {
                warn!(sale_id, "Resuming interrupted cancellation");
            }
        }

        self.finish_cancellation(&sale).await
    }

    /// Restores every line and moves cancelling → cancelled with the
    /// expense movement. Safe to run any number of times.
    pub(crate) async fn finish_cancellation(&self, sale: &Sale) -> EngineResult<Sale> {
        let journal = self.sale_journal(&sale.id).await?;

        for item in &sale.items {
            let Some(entry) = journal.get(&sale_line_key(&sale.id, item.line_no)) else {
                warn!(sale_id = %sale.id, line_no = item.line_no, "No journaled decrement to restore");
                continue;
            };
            if entry.applied_delta == 0 {
                continue;
            }
            let options = DeltaOptions::for_sale(
                &sale.id,
                cancel_key(&sale.id, item.line_no),
                StockReason::SaleCancellation,
                DeltaPolicy::Clamp,
            );
            self.ledger
                .apply_delta(&sale.owner_id, &entry.product_id, -entry.applied_delta, &options)
                .await?;
        }

        let at = Utc::now();
        let transition = SaleTransition {
            sale_id: sale.id.clone(),
            from: SaleStatus::Cancelling,
            to: SaleStatus::Cancelled,
            at,
            movement: Some(sale_movement(sale, MovementKind::Expense, at)),
        };
        let finalized = bounded(
            self.config.store_timeout,
            "transition_sale",
            self.sales.transition_sale(&transition),
        )
        .await?;

        let current = self.require_sale(&sale.id).await?;
        if finalized {
            info!(sale_id = %sale.id, total = sale.total_cents, "Sale cancelled");
        } else if current.status != SaleStatus::Cancelled {
            return Err(EngineError::InvalidSaleStatus {
                sale_id: current.id,
                current: current.status,
            });
        }
        Ok(current)
    }

    // =========================================================================
    // Reads & Notes
    // =========================================================================

    pub async fn update_sale_notes(
        &self,
        owner_id: &str,
        sale_id: &str,
        notes: Option<&str>,
    ) -> EngineResult<Sale> {
        let notes = normalize_notes(notes);
        validate_notes(notes.as_deref())?;

        let sale = self.owned_sale(owner_id, sale_id).await?;
        let updated = bounded(
            self.config.store_timeout,
            "update_sale_notes",
            self.sales
                .update_sale_notes(&sale.id, notes.as_deref(), Utc::now()),
        )
        .await?;
        if !updated {
            return Err(EngineError::not_found("Sale", sale_id));
        }

        self.require_sale(sale_id).await
    }

    pub async fn get_sale(&self, owner_id: &str, sale_id: &str) -> EngineResult<Sale> {
        self.owned_sale(owner_id, sale_id).await
    }

    pub async fn list_sales(
        &self,
        owner_id: &str,
        filter: &SaleFilter,
        page: Page,
    ) -> EngineResult<Vec<Sale>> {
        bounded(
            self.config.store_timeout,
            "list_sales",
            self.sales.list_sales(owner_id, filter, page),
        )
        .await
    }

    async fn owned_sale(&self, owner_id: &str, sale_id: &str) -> EngineResult<Sale> {
        let sale = self.require_sale(sale_id).await?;
        ensure_owner("Sale", sale_id, &sale.owner_id, owner_id)?;
        Ok(sale)
    }

    pub(crate) async fn require_sale(&self, sale_id: &str) -> EngineResult<Sale> {
        bounded(
            self.config.store_timeout,
            "get_sale",
            self.sales.get_sale(sale_id),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("Sale", sale_id))
    }

    /// Store handles used by the reconciler.
    pub(crate) fn sale_store(&self) -> &Arc<dyn SaleStore> {
        &self.sales
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }
}

fn sale_movement(sale: &Sale, kind: MovementKind, at: DateTime<Utc>) -> CashMovement {
    let concept = match kind {
        MovementKind::Income => SALE_CONCEPT,
        MovementKind::Expense => REFUND_CONCEPT,
    };
    CashMovement {
        id: new_id(),
        owner_id: sale.owner_id.clone(),
        kind,
        concept: concept.to_string(),
        amount_cents: sale.total_cents,
        payment_method: Some(sale.payment_method),
        notes: Some(format!("Sale {}", sale.number)),
        reference_table: Some(SALES_REFERENCE.to_string()),
        reference_id: Some(sale.id.clone()),
        created_at: at,
    }
}

fn normalize_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

fn attach_line(err: EngineError, line: u32) -> EngineError {
    match err {
        EngineError::InsufficientStock {
            product_id,
            code,
            line_no: None,
            available,
            requested,
        } => EngineError::InsufficientStock {
            product_id,
            code,
            line_no: Some(line),
            available,
            requested,
        },
        other => other,
    }
}
