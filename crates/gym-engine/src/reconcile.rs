//! # Reconciler
//!
//! Settles sales left in a saga sub-state by a crash, a timeout or a failed
//! compensation.
//!
//! ```text
//! pending  (older than threshold)
//!    ├── every line journaled, nothing reversed ──► completed + income
//!    └── otherwise ──► claim (reverting) ──► reverse journaled lines ──► cancelled
//!
//! reverting (older than threshold)
//!    └── reverse journaled lines (same keys) ──► cancelled
//!
//! cancelling (older than threshold)
//!    └── restore lines (same keys) ──► cancelled + expense
//! ```
//!
//! A lost compare-and-swap means someone else settled the sale first. It is
//! logged with the status found and the sale is left alone.
//!
//! Every step reuses the idempotency keys of the original saga, so running
//! the reconciler twice, or alongside a resumed cancel, cannot move stock
//! twice.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use gym_core::sale::{reversal_key, sale_line_key};
use gym_core::{Sale, SaleStatus};

use crate::call::bounded;
use crate::error::EngineResult;
use crate::sales::{RollBack, SaleProcessor};

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub examined: usize,
    /// Pending sales rolled forward.
    pub completed: Vec<String>,
    /// Pending sales rolled back, and reversals or cancellations finished.
    pub cancelled: Vec<String>,
    /// Sales another caller settled while this pass looked at them.
    pub skipped: Vec<String>,
    /// `(sale_id, error)` for sales that could not be settled this pass.
    pub failures: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Outcome {
    Completed,
    Cancelled,
    Skipped,
}

#[derive(Clone)]
pub struct Reconciler {
    processor: SaleProcessor,
}

impl Reconciler {
    pub fn new(processor: SaleProcessor) -> Self {
        Reconciler { processor }
    }

    /// Settles every sale stuck in a sub-state for longer than `older_than`.
    pub async fn reconcile_stale_sales(&self, older_than: Duration) -> EngineResult<ReconcileReport> {
        self.reconcile_before(Utc::now() - older_than).await
    }

    /// Settles every sub-state sale last updated before `cutoff`.
    ///
    /// Per-sale failures are collected in the report; only a failure to
    /// list stale sales is returned as an error.
    pub async fn reconcile_before(&self, cutoff: DateTime<Utc>) -> EngineResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for status in [SaleStatus::Pending, SaleStatus::Reverting, SaleStatus::Cancelling] {
            let stale = self.stale(status, cutoff).await?;
            for sale in stale {
                report.examined += 1;
                match self.settle(&sale).await {
                    Ok(Outcome::Completed) => report.completed.push(sale.id.clone()),
                    Ok(Outcome::Cancelled) => report.cancelled.push(sale.id.clone()),
                    Ok(Outcome::Skipped) => report.skipped.push(sale.id.clone()),
                    Err(err) => {
                        error!(sale_id = %sale.id, status = %sale.status, error = %err, "Failed to reconcile sale");
                        report.failures.push((sale.id.clone(), err.to_string()));
                    }
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                completed = report.completed.len(),
                cancelled = report.cancelled.len(),
                skipped = report.skipped.len(),
                failures = report.failures.len(),
                "Reconciliation pass finished"
            );
        }
        Ok(report)
    }

    async fn stale(&self, status: SaleStatus, cutoff: DateTime<Utc>) -> EngineResult<Vec<Sale>> {
        let config = self.processor.config();
        bounded(
            config.store_timeout,
            "stale_sales",
            self.processor
                .sale_store()
                .stale_sales(status, cutoff, config.reconcile_batch_size),
        )
        .await
    }

    async fn settle(&self, sale: &Sale) -> EngineResult<Outcome> {
        match sale.status {
            SaleStatus::Pending => self.settle_pending(sale).await,
            SaleStatus::Reverting => {
                self.processor.finish_reversal(sale).await?;
                info!(sale_id = %sale.id, "Interrupted reversal finished");
                Ok(Outcome::Cancelled)
            }
            SaleStatus::Cancelling => {
                self.processor.finish_cancellation(sale).await?;
                Ok(Outcome::Cancelled)
            }
            status => {
                warn!(sale_id = %sale.id, %status, "Sale is not awaiting reconciliation, skipped");
                Ok(Outcome::Skipped)
            }
        }
    }

    async fn settle_pending(&self, sale: &Sale) -> EngineResult<Outcome> {
        let journal = self.processor.sale_journal(&sale.id).await?;

        let fully_applied = !sale.items.is_empty()
            && sale.items.iter().all(|item| {
                journal.contains_key(&sale_line_key(&sale.id, item.line_no))
                    && !journal.contains_key(&reversal_key(&sale.id, item.line_no))
            });

        if fully_applied {
            if self.processor.complete(sale, Utc::now()).await? {
                info!(sale_id = %sale.id, "Stale pending sale completed");
                return Ok(Outcome::Completed);
            }
            let current = self.processor.require_sale(&sale.id).await?;
            warn!(sale_id = %sale.id, status = %current.status, "Stale sale settled concurrently, skipped");
            return Ok(Outcome::Skipped);
        }

        match self.processor.roll_back(sale).await? {
            RollBack::Cancelled => {
                info!(sale_id = %sale.id, "Stale pending sale rolled back");
                Ok(Outcome::Cancelled)
            }
            RollBack::Joined => {
                warn!(sale_id = %sale.id, "Stale sale was already being rolled back; reversals re-issued");
                Ok(Outcome::Cancelled)
            }
            RollBack::Lost(status) => {
                warn!(sale_id = %sale.id, %status, "Stale sale settled concurrently, skipped");
                Ok(Outcome::Skipped)
            }
        }
    }
}
