//! # Product Repository
//!
//! Products, conditional stock writes and the stock journal.
//!
//! ## Conditional Stock Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Ledger read: P { qty: 10, version: 7 }                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                 │
//! │  UPDATE products SET stock_quantity = 3, version = 8                   │
//! │   WHERE id = P AND version = 7                                         │
//! │       │                                                                 │
//! │       ├── 0 rows → ROLLBACK → Conflict (someone else wrote first)     │
//! │       ▼                                                                 │
//! │  INSERT INTO stock_journal (..., idempotency_key = 'S:1:sale')         │
//! │       │                                                                 │
//! │       ├── UNIQUE violation → ROLLBACK → DuplicateKey(existing entry)  │
//! │       ▼                                                                 │
//! │  COMMIT → Applied                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use gym_core::{Page, Product, ProductFilter, StockJournalEntry};

use crate::error::{DbError, DbResult};
use crate::repository::like_pattern;
use crate::store::{CatalogStore, StockWrite, StockWriteRequest};

const PRODUCT_COLUMNS: &str = "id, owner_id, code, name, description, cost_cents, price_cents, \
     stock_quantity, reorder_threshold, status, is_active, version, created_at, updated_at";

const JOURNAL_COLUMNS: &str = "id, product_id, owner_id, idempotency_key, requested_delta, \
     applied_delta, previous_quantity, new_quantity, new_status, sale_id, reason, created_at";

/// Repository for products and their stock journal.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Counts products of one owner, inactive included.
    pub async fn count(&self, owner_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE owner_id = ?1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn insert_journal(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &StockJournalEntry,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_journal (
            id, product_id, owner_id, idempotency_key, requested_delta,
            applied_delta, previous_quantity, new_quantity, new_status,
            sale_id, reason, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.product_id)
    .bind(&entry.owner_id)
    .bind(&entry.idempotency_key)
    .bind(entry.requested_delta)
    .bind(entry.applied_delta)
    .bind(entry.previous_quantity)
    .bind(entry.new_quantity)
    .bind(entry.new_status)
    .bind(&entry.sale_id)
    .bind(entry.reason)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl CatalogStore for ProductRepository {
    async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    async fn put_product(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, code = %product.code, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, owner_id, code, name, description, cost_cents, price_cents,
                stock_quantity, reorder_threshold, status, is_active, version,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&product.id)
        .bind(&product.owner_id)
        .bind(&product.code)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.cost_cents)
        .bind(product.price_cents)
        .bind(product.stock_quantity)
        .bind(product.reorder_threshold)
        .bind(product.status)
        .bind(product.is_active)
        .bind(product.version)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } if field.contains("code") => {
                DbError::duplicate("code", product.code.clone())
            }
            other => other,
        })?;

        Ok(())
    }

    async fn update_product(&self, product: &Product, expected_version: i64) -> DbResult<bool> {
        debug!(id = %product.id, expected_version, "Updating product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                code = ?1,
                name = ?2,
                description = ?3,
                cost_cents = ?4,
                price_cents = ?5,
                stock_quantity = ?6,
                reorder_threshold = ?7,
                status = ?8,
                is_active = ?9,
                version = ?10 + 1,
                updated_at = ?11
            WHERE id = ?12 AND version = ?10
            "#,
        )
        .bind(&product.code)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.cost_cents)
        .bind(product.price_cents)
        .bind(product.stock_quantity)
        .bind(product.reorder_threshold)
        .bind(product.status)
        .bind(product.is_active)
        .bind(expected_version)
        .bind(product.updated_at)
        .bind(&product.id)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } if field.contains("code") => {
                DbError::duplicate("code", product.code.clone())
            }
            other => other,
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_code(&self, owner_id: &str, code: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE owner_id = ?1 AND code = ?2"
        ))
        .bind(owner_id)
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    async fn apply_stock_write(&self, request: &StockWriteRequest) -> DbResult<StockWrite> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE products SET
                stock_quantity = ?1,
                status = ?2,
                version = version + 1,
                updated_at = ?3
            WHERE id = ?4 AND version = ?5
            "#,
        )
        .bind(request.new_quantity)
        .bind(request.new_status)
        .bind(request.journal.created_at)
        .bind(&request.product_id)
        .bind(request.expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(
                product_id = %request.product_id,
                expected_version = request.expected_version,
                "Stock write lost the version race"
            );
            return Ok(StockWrite::Conflict);
        }

        match insert_journal(&mut tx, &request.journal).await {
            Ok(()) => {}
            Err(e) if e.is_unique_violation_on("idempotency_key") => {
                tx.rollback().await?;
                let key = request.journal.idempotency_key.as_deref().unwrap_or_default();
                return match self.journal_by_key(key).await? {
                    Some(existing) => Ok(StockWrite::DuplicateKey(existing)),
                    None => Err(DbError::Internal(format!(
                        "idempotency key {key} reported duplicate but not found"
                    ))),
                };
            }
            Err(e) => return Err(e),
        }

        tx.commit().await?;

        debug!(
            product_id = %request.product_id,
            new_quantity = request.new_quantity,
            key = ?request.journal.idempotency_key,
            "Stock write applied"
        );
        Ok(StockWrite::Applied(request.journal.clone()))
    }

    async fn journal_for_sale(&self, sale_id: &str) -> DbResult<Vec<StockJournalEntry>> {
        let entries = sqlx::query_as::<_, StockJournalEntry>(&format!(
            "SELECT {JOURNAL_COLUMNS} FROM stock_journal WHERE sale_id = ?1 \
             ORDER BY created_at, rowid"
        ))
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn journal_by_key(&self, key: &str) -> DbResult<Option<StockJournalEntry>> {
        let entry = sqlx::query_as::<_, StockJournalEntry>(&format!(
            "SELECT {JOURNAL_COLUMNS} FROM stock_journal WHERE idempotency_key = ?1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn journal_for_product(
        &self,
        product_id: &str,
        page: Page,
    ) -> DbResult<Vec<StockJournalEntry>> {
        let entries = sqlx::query_as::<_, StockJournalEntry>(&format!(
            "SELECT {JOURNAL_COLUMNS} FROM stock_journal WHERE product_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
        ))
        .bind(product_id)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn is_referenced_by_sale(&self, product_id: &str) -> DbResult<bool> {
        let referenced: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM sale_items WHERE product_id = ?1)",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(referenced)
    }

    async fn delete_product(&self, id: &str) -> DbResult<bool> {
        debug!(id = %id, "Deleting product");

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_products(
        &self,
        owner_id: &str,
        filter: &ProductFilter,
        page: Page,
    ) -> DbResult<Vec<Product>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE owner_id = "
        ));
        qb.push_bind(owner_id);

        if !filter.include_inactive {
            qb.push(" AND is_active = 1");
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = like_pattern(search);
            qb.push(" AND (code LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR name LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }

        qb.push(" ORDER BY name, code LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(page.offset));

        let products = qb.build_query_as::<Product>().fetch_all(&self.pool).await?;

        debug!(count = products.len(), "Listed products");
        Ok(products)
    }
}
