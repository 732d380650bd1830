//! # Sale Repository
//!
//! Sales, their line items, and status transitions.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. insert_sale()      → sale + items, status pending (one tx)         │
//! │  2. (engine applies stock decrements through CatalogStore)             │
//! │  3. transition_sale()  → pending → completed + income movement (one tx)│
//! │                                                                         │
//! │  Cancel:                                                               │
//! │  4. transition_sale()  → completed → cancelling                        │
//! │  5. (engine restores stock)                                            │
//! │  6. transition_sale()  → cancelling → cancelled + expense movement     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use gym_core::{CashMovement, Page, Sale, SaleFilter, SaleItem, SaleStatus};

use crate::error::DbResult;
use crate::store::{SaleStore, SaleTransition};

const SALE_COLUMNS: &str = "id, owner_id, number, status, total_cents, payment_method, notes, \
     created_at, updated_at, completed_at, cancelled_at";

const ITEM_COLUMNS: &str = "sale_id, line_no, product_id, code_snapshot, name_snapshot, \
     quantity, unit_price_cents, subtotal_cents";

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets all items for a sale, ordered by line number.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY line_no"
        ))
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn with_items(&self, mut sales: Vec<Sale>) -> DbResult<Vec<Sale>> {
        for sale in &mut sales {
            sale.items = self.get_items(&sale.id).await?;
        }
        Ok(sales)
    }
}

/// Inserts into cash_movements unless the (reference, kind) pair already exists.
pub(crate) async fn insert_movement_once(
    tx: &mut Transaction<'_, Sqlite>,
    movement: &CashMovement,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO cash_movements (
            id, owner_id, kind, concept, amount_cents, payment_method, notes,
            reference_table, reference_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT (reference_table, reference_id, kind) DO NOTHING
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.owner_id)
    .bind(movement.kind)
    .bind(&movement.concept)
    .bind(movement.amount_cents)
    .bind(movement.payment_method)
    .bind(&movement.notes)
    .bind(&movement.reference_table)
    .bind(&movement.reference_id)
    .bind(movement.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[async_trait]
impl SaleStore for SaleRepository {
    async fn insert_sale(&self, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, number = %sale.number, items = sale.items.len(), "Inserting sale");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, owner_id, number, status, total_cents, payment_method, notes,
                created_at, updated_at, completed_at, cancelled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.owner_id)
        .bind(&sale.number)
        .bind(sale.status)
        .bind(sale.total_cents)
        .bind(sale.payment_method)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .bind(sale.completed_at)
        .bind(sale.cancelled_at)
        .execute(&mut *tx)
        .await?;

        for item in &sale.items {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    sale_id, line_no, product_id, code_snapshot, name_snapshot,
                    quantity, unit_price_cents, subtotal_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&item.sale_id)
            .bind(item.line_no)
            .bind(&item.product_id)
            .bind(&item.code_snapshot)
            .bind(&item.name_snapshot)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.subtotal_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_sale(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match sale {
            Some(mut sale) => {
                sale.items = self.get_items(&sale.id).await?;
                Ok(Some(sale))
            }
            None => Ok(None),
        }
    }

    async fn transition_sale(&self, transition: &SaleTransition) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let completed_at = (transition.to == SaleStatus::Completed).then_some(transition.at);
        let cancelled_at = (transition.to == SaleStatus::Cancelled).then_some(transition.at);

        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = ?1,
                updated_at = ?2,
                completed_at = COALESCE(?3, completed_at),
                cancelled_at = COALESCE(?4, cancelled_at)
            WHERE id = ?5 AND status = ?6
            "#,
        )
        .bind(transition.to)
        .bind(transition.at)
        .bind(completed_at)
        .bind(cancelled_at)
        .bind(&transition.sale_id)
        .bind(transition.from)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(
                sale_id = %transition.sale_id,
                from = %transition.from,
                to = %transition.to,
                "Sale transition precondition failed"
            );
            return Ok(false);
        }

        if let Some(movement) = &transition.movement {
            let inserted = insert_movement_once(&mut tx, movement).await?;
            if !inserted {
                debug!(sale_id = %transition.sale_id, "Cash movement already recorded");
            }
        }

        tx.commit().await?;

        debug!(
            sale_id = %transition.sale_id,
            from = %transition.from,
            to = %transition.to,
            "Sale transitioned"
        );
        Ok(true)
    }

    async fn update_sale_notes(
        &self,
        id: &str,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query("UPDATE sales SET notes = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(notes)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_sales(
        &self,
        owner_id: &str,
        filter: &SaleFilter,
        page: Page,
    ) -> DbResult<Vec<Sale>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE owner_id = "
        ));
        qb.push_bind(owner_id);

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(min) = filter.min_total_cents {
            qb.push(" AND total_cents >= ").push_bind(min);
        }
        if let Some(max) = filter.max_total_cents {
            qb.push(" AND total_cents <= ").push_bind(max);
        }
        if let Some(from) = filter.from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND created_at <= ").push_bind(to);
        }

        qb.push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(page.offset));

        let sales = qb.build_query_as::<Sale>().fetch_all(&self.pool).await?;
        self.with_items(sales).await
    }

    async fn stale_sales(
        &self,
        status: SaleStatus,
        before: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE status = ?1 AND updated_at < ?2 \
             ORDER BY updated_at LIMIT ?3"
        ))
        .bind(status)
        .bind(before)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        self.with_items(sales).await
    }
}
