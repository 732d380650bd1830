//! # Catalog Admin
//!
//! Product create, edit, enable/disable and delete.
//!
//! Edits go through the same version compare-and-swap as stock deltas, so
//! an edit racing a sale is retried against the fresh row instead of
//! overwriting the sale's decrement. Status is re-derived on every edit.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use gym_core::validation::{
    validate_code, validate_name, validate_notes, validate_price_cents, validate_search_query,
    validate_stock_level,
};
use gym_core::{
    derive_status, new_id, NewProduct, Page, Product, ProductFilter, ProductPatch,
    StockJournalEntry, DEFAULT_REORDER_THRESHOLD,
};
use gym_db::CatalogStore;

use crate::call::{bounded, ensure_owner};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{StockChange, StockLedger};

/// What `delete_product` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The row is gone.
    Deleted,
    /// The product appears on a sale line and was soft-disabled instead.
    Disabled,
}

#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogStore>,
    ledger: StockLedger,
    config: EngineConfig,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn CatalogStore>, config: EngineConfig) -> Self {
        let ledger = StockLedger::new(catalog.clone(), config.clone());
        CatalogService {
            catalog,
            ledger,
            config,
        }
    }

    pub async fn create_product(&self, owner_id: &str, new: NewProduct) -> EngineResult<Product> {
        let code = new.code.trim().to_string();
        let name = new.name.trim().to_string();
        let threshold = new.reorder_threshold.unwrap_or(DEFAULT_REORDER_THRESHOLD);

        validate_code(&code)?;
        validate_name("name", &name)?;
        validate_notes(new.description.as_deref())?;
        validate_price_cents("cost", new.cost_cents)?;
        validate_price_cents("price", new.price_cents)?;
        validate_stock_level("stock_quantity", new.stock_quantity)?;
        validate_stock_level("reorder_threshold", threshold)?;

        self.ensure_code_free(owner_id, &code, None).await?;

        let now = Utc::now();
        let product = Product {
            id: new_id(),
            owner_id: owner_id.to_string(),
            code,
            name,
            description: trimmed(new.description),
            cost_cents: new.cost_cents,
            price_cents: new.price_cents,
            stock_quantity: new.stock_quantity,
            reorder_threshold: threshold,
            status: derive_status(new.stock_quantity, threshold),
            is_active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        bounded(
            self.config.store_timeout,
            "put_product",
            self.catalog.put_product(&product),
        )
        .await?;

        info!(id = %product.id, code = %product.code, stock = product.stock_quantity, "Product created");
        Ok(product)
    }

    /// Applies an administrative edit, retrying on version conflicts.
    pub async fn update_product(
        &self,
        owner_id: &str,
        product_id: &str,
        patch: ProductPatch,
    ) -> EngineResult<Product> {
        let patch = validated(patch)?;

        for attempt in 1..=self.config.max_attempts {
            let current = self.owned_product(owner_id, product_id).await?;

            if let Some(code) = patch.code.as_deref() {
                if code != current.code {
                    self.ensure_code_free(owner_id, code, Some(product_id)).await?;
                }
            }

            let updated = apply_patch(current.clone(), &patch);
            if self.write(&updated, current.version).await? {
                debug!(id = %product_id, status = %updated.status, "Product updated");
                return Ok(Product {
                    version: current.version + 1,
                    ..updated
                });
            }

            warn!(id = %product_id, attempt, "Product edit lost a race, retrying");
        }

        Err(EngineError::ConcurrentModification {
            entity: "Product".to_string(),
            id: product_id.to_string(),
            attempts: self.config.max_attempts,
        })
    }

    pub async fn set_product_active(
        &self,
        owner_id: &str,
        product_id: &str,
        active: bool,
    ) -> EngineResult<Product> {
        for _ in 0..self.config.max_attempts {
            let current = self.owned_product(owner_id, product_id).await?;
            if current.is_active == active {
                return Ok(current);
            }

            let updated = Product {
                is_active: active,
                updated_at: Utc::now(),
                ..current.clone()
            };
            if self.write(&updated, current.version).await? {
                info!(id = %product_id, active, "Product toggled");
                return Ok(Product {
                    version: current.version + 1,
                    ..updated
                });
            }
        }

        Err(EngineError::ConcurrentModification {
            entity: "Product".to_string(),
            id: product_id.to_string(),
            attempts: self.config.max_attempts,
        })
    }

    /// Hard-deletes a product no sale references; soft-disables it otherwise.
    pub async fn delete_product(
        &self,
        owner_id: &str,
        product_id: &str,
    ) -> EngineResult<DeleteOutcome> {
        self.owned_product(owner_id, product_id).await?;

        let referenced = bounded(
            self.config.store_timeout,
            "is_referenced_by_sale",
            self.catalog.is_referenced_by_sale(product_id),
        )
        .await?;

        if referenced {
            self.set_product_active(owner_id, product_id, false).await?;
            info!(id = %product_id, "Product referenced by sales; disabled instead of deleted");
            return Ok(DeleteOutcome::Disabled);
        }

        let deleted = bounded(
            self.config.store_timeout,
            "delete_product",
            self.catalog.delete_product(product_id),
        )
        .await?;
        if !deleted {
            return Err(EngineError::not_found("Product", product_id));
        }

        info!(id = %product_id, "Product deleted");
        Ok(DeleteOutcome::Deleted)
    }

    pub async fn get_product(&self, owner_id: &str, product_id: &str) -> EngineResult<Product> {
        self.owned_product(owner_id, product_id).await
    }

    pub async fn find_by_code(&self, owner_id: &str, code: &str) -> EngineResult<Option<Product>> {
        bounded(
            self.config.store_timeout,
            "find_by_code",
            self.catalog.find_by_code(owner_id, code),
        )
        .await
    }

    pub async fn list_products(
        &self,
        owner_id: &str,
        filter: &ProductFilter,
        page: Page,
    ) -> EngineResult<Vec<Product>> {
        let mut filter = filter.clone();
        if let Some(search) = filter.search.as_deref() {
            filter.search = Some(validate_search_query(search)?);
        }

        bounded(
            self.config.store_timeout,
            "list_products",
            self.catalog.list_products(owner_id, &filter, page),
        )
        .await
    }

    /// Administrative stock adjustment through the ledger (clamp policy).
    pub async fn adjust_stock(
        &self,
        owner_id: &str,
        product_id: &str,
        delta: i64,
    ) -> EngineResult<StockChange> {
        self.ledger.adjust_stock(owner_id, product_id, delta).await
    }

    /// Journal entries for a product, newest first.
    pub async fn stock_history(
        &self,
        owner_id: &str,
        product_id: &str,
        page: Page,
    ) -> EngineResult<Vec<StockJournalEntry>> {
        self.owned_product(owner_id, product_id).await?;
        bounded(
            self.config.store_timeout,
            "journal_for_product",
            self.catalog.journal_for_product(product_id, page),
        )
        .await
    }

    async fn owned_product(&self, owner_id: &str, product_id: &str) -> EngineResult<Product> {
        let product = bounded(
            self.config.store_timeout,
            "get_product",
            self.catalog.get_product(product_id),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("Product", product_id))?;
        ensure_owner("Product", product_id, &product.owner_id, owner_id)?;
        Ok(product)
    }

    async fn ensure_code_free(
        &self,
        owner_id: &str,
        code: &str,
        except_id: Option<&str>,
    ) -> EngineResult<()> {
        match self.find_by_code(owner_id, code).await? {
            Some(existing) if Some(existing.id.as_str()) != except_id => {
                Err(EngineError::Duplicate {
                    field: "code".to_string(),
                    value: code.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn write(&self, product: &Product, expected_version: i64) -> EngineResult<bool> {
        bounded(
            self.config.store_timeout,
            "update_product",
            self.catalog.update_product(product, expected_version),
        )
        .await
    }
}

/// Checks and trims a patch before any read.
fn validated(mut patch: ProductPatch) -> EngineResult<ProductPatch> {
    if let Some(code) = patch.code.as_mut() {
        *code = code.trim().to_string();
        validate_code(code)?;
    }
    if let Some(name) = patch.name.as_mut() {
        *name = name.trim().to_string();
        validate_name("name", name)?;
    }
    if let Some(description) = patch.description.take() {
        let description = trimmed(description);
        validate_notes(description.as_deref())?;
        patch.description = Some(description);
    }
    if let Some(cost) = patch.cost_cents {
        validate_price_cents("cost", cost)?;
    }
    if let Some(price) = patch.price_cents {
        validate_price_cents("price", price)?;
    }
    if let Some(quantity) = patch.stock_quantity {
        validate_stock_level("stock_quantity", quantity)?;
    }
    if let Some(threshold) = patch.reorder_threshold {
        validate_stock_level("reorder_threshold", threshold)?;
    }
    Ok(patch)
}

fn apply_patch(mut product: Product, patch: &ProductPatch) -> Product {
    if let Some(code) = &patch.code {
        product.code = code.clone();
    }
    if let Some(name) = &patch.name {
        product.name = name.clone();
    }
    if let Some(description) = &patch.description {
        product.description = description.clone();
    }
    if let Some(cost) = patch.cost_cents {
        product.cost_cents = cost;
    }
    if let Some(price) = patch.price_cents {
        product.price_cents = price;
    }
    if let Some(quantity) = patch.stock_quantity {
        product.stock_quantity = quantity;
    }
    if let Some(threshold) = patch.reorder_threshold {
        product.reorder_threshold = threshold;
    }
    product.status = derive_status(product.stock_quantity, product.reorder_threshold);
    product.updated_at = Utc::now();
    product
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gym_core::StockStatus;

    fn product() -> Product {
        let now = Utc::now();
        Product {
            id: "p1".into(),
            owner_id: "o1".into(),
            code: "WATER-500".into(),
            name: "Water 500ml".into(),
            description: None,
            cost_cents: 600,
            price_cents: 1500,
            stock_quantity: 10,
            reorder_threshold: 5,
            status: StockStatus::InStock,
            is_active: true,
            version: 4,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_threshold_edit_rederives_status() {
        let patch = ProductPatch {
            reorder_threshold: Some(10),
            ..ProductPatch::default()
        };
        let updated = apply_patch(product(), &patch);
        assert_eq!(updated.status, StockStatus::LowStock);
        assert_eq!(updated.version, 4);
    }

    #[test]
    fn test_quantity_edit_rederives_status() {
        let patch = ProductPatch {
            stock_quantity: Some(0),
            ..ProductPatch::default()
        };
        assert_eq!(apply_patch(product(), &patch).status, StockStatus::OutOfStock);
    }

    #[test]
    fn test_patch_validation() {
        let bad = ProductPatch {
            stock_quantity: Some(-1),
            ..ProductPatch::default()
        };
        assert!(validated(bad).is_err());

        let blank_description = ProductPatch {
            description: Some(Some("   ".into())),
            ..ProductPatch::default()
        };
        assert_eq!(validated(blank_description).unwrap().description, Some(None));
    }
}
