//! # Cash Movement Repository
//!
//! Cash movements and the concept catalog offered for manual entries.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use gym_core::{CashMovement, MovementConcept, MovementFilter, MovementKind, Page};

use crate::error::{DbError, DbResult};
use crate::store::MovementStore;

const MOVEMENT_COLUMNS: &str = "id, owner_id, kind, concept, amount_cents, payment_method, \
     notes, reference_table, reference_id, created_at";

const CONCEPT_COLUMNS: &str = "id, owner_id, name, kind, is_active, created_at";

#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }
}

#[async_trait]
impl MovementStore for MovementRepository {
    async fn insert_movement(&self, movement: &CashMovement) -> DbResult<()> {
        debug!(id = %movement.id, kind = ?movement.kind, amount = movement.amount_cents, "Inserting cash movement");

        sqlx::query(
            r#"
            INSERT INTO cash_movements (
                id, owner_id, kind, concept, amount_cents, payment_method, notes,
                reference_table, reference_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
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
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_movements(
        &self,
        owner_id: &str,
        filter: &MovementFilter,
        page: Page,
    ) -> DbResult<Vec<CashMovement>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MOVEMENT_COLUMNS} FROM cash_movements WHERE owner_id = "
        ));
        qb.push_bind(owner_id);

        if let Some(kind) = filter.kind {
            qb.push(" AND kind = ").push_bind(kind);
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

        let movements = qb
            .build_query_as::<CashMovement>()
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    async fn movements_for_reference(
        &self,
        reference_table: &str,
        reference_id: &str,
    ) -> DbResult<Vec<CashMovement>> {
        let movements = sqlx::query_as::<_, CashMovement>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM cash_movements \
             WHERE reference_table = ?1 AND reference_id = ?2 ORDER BY created_at"
        ))
        .bind(reference_table)
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    async fn get_movement(&self, id: &str) -> DbResult<Option<CashMovement>> {
        let movement = sqlx::query_as::<_, CashMovement>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM cash_movements WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(movement)
    }

    async fn update_movement(&self, movement: &CashMovement) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE cash_movements SET
                kind = ?1,
                concept = ?2,
                amount_cents = ?3,
                payment_method = ?4,
                notes = ?5
            WHERE id = ?6
            "#,
        )
        .bind(movement.kind)
        .bind(&movement.concept)
        .bind(movement.amount_cents)
        .bind(movement.payment_method)
        .bind(&movement.notes)
        .bind(&movement.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_movement(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM cash_movements WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_concept(&self, concept: &MovementConcept) -> DbResult<()> {
        debug!(id = %concept.id, name = %concept.name, "Inserting movement concept");

        sqlx::query(
            "INSERT INTO movement_concepts (id, owner_id, name, kind, is_active, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&concept.id)
        .bind(&concept.owner_id)
        .bind(&concept.name)
        .bind(concept.kind)
        .bind(concept.is_active)
        .bind(concept.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("name", &concept.name),
            other => other,
        })?;

        Ok(())
    }

    async fn list_concepts(
        &self,
        owner_id: &str,
        kind: Option<MovementKind>,
    ) -> DbResult<Vec<MovementConcept>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {CONCEPT_COLUMNS} FROM movement_concepts WHERE is_active = 1 AND owner_id = "
        ));
        qb.push_bind(owner_id);

        if let Some(kind) = kind {
            qb.push(" AND kind = ").push_bind(kind);
        }
        qb.push(" ORDER BY name");

        let concepts = qb
            .build_query_as::<MovementConcept>()
            .fetch_all(&self.pool)
            .await?;

        Ok(concepts)
    }
}
