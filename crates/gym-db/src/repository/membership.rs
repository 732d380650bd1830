//! # Membership Repository
//!
//! Membership types and the instances assigned to members.
//!
//! ## Payment Status Writes
//! ```text
//! mark_paid(id)     UPDATE ... SET payment_status = 'paid'   WHERE id = ? AND payment_status = 'unpaid'
//! mark_expired(id)  UPDATE ... SET payment_status = 'unpaid' WHERE id = ? AND payment_status = 'paid'
//! ```
//! Both are conditional, so concurrent sweeps and repeated calls are no-ops.
//!
//! `expired_paid` pages with a `(end_date, id)` keyset, so rows the sweep
//! could not transition never hide the rows after them.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use gym_core::{MemberMembership, MembershipType, MembershipTypeFilter, PaymentStatus};

use crate::error::{DbError, DbResult};
use crate::repository::like_pattern;
use crate::store::MembershipStore;

const TYPE_COLUMNS: &str = "id, owner_id, name, description, price_cents, duration_months, \
     duration_weeks, duration_days, kind, is_active, created_at, updated_at";

const MEMBERSHIP_COLUMNS: &str = "id, owner_id, member_id, membership_type_id, start_date, \
     end_date, payment_status, price_cents, notes, paid_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct MembershipRepository {
    pool: SqlitePool,
}

impl MembershipRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MembershipRepository { pool }
    }
}

fn map_type_name_conflict(err: sqlx::Error, name: &str) -> DbError {
    match DbError::from(err) {
        DbError::UniqueViolation { field, .. } if field.contains("name") => {
            DbError::duplicate("name", name)
        }
        other => other,
    }
}

#[async_trait]
impl MembershipStore for MembershipRepository {
    async fn get_type(&self, id: &str) -> DbResult<Option<MembershipType>> {
        let membership_type = sqlx::query_as::<_, MembershipType>(&format!(
            "SELECT {TYPE_COLUMNS} FROM membership_types WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership_type)
    }

    async fn find_type_by_name(
        &self,
        owner_id: &str,
        name: &str,
    ) -> DbResult<Option<MembershipType>> {
        // The name column is COLLATE NOCASE.
        let membership_type = sqlx::query_as::<_, MembershipType>(&format!(
            "SELECT {TYPE_COLUMNS} FROM membership_types WHERE owner_id = ?1 AND name = ?2"
        ))
        .bind(owner_id)
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership_type)
    }

    async fn insert_type(&self, membership_type: &MembershipType) -> DbResult<()> {
        debug!(id = %membership_type.id, name = %membership_type.name, "Inserting membership type");

        sqlx::query(
            r#"
            INSERT INTO membership_types (
                id, owner_id, name, description, price_cents, duration_months,
                duration_weeks, duration_days, kind, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&membership_type.id)
        .bind(&membership_type.owner_id)
        .bind(&membership_type.name)
        .bind(&membership_type.description)
        .bind(membership_type.price_cents)
        .bind(membership_type.duration.months)
        .bind(membership_type.duration.weeks)
        .bind(membership_type.duration.days)
        .bind(membership_type.kind)
        .bind(membership_type.is_active)
        .bind(membership_type.created_at)
        .bind(membership_type.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_type_name_conflict(e, &membership_type.name))?;

        Ok(())
    }

    async fn update_type(&self, membership_type: &MembershipType) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE membership_types SET
                name = ?1,
                description = ?2,
                price_cents = ?3,
                duration_months = ?4,
                duration_weeks = ?5,
                duration_days = ?6,
                kind = ?7,
                is_active = ?8,
                updated_at = ?9
            WHERE id = ?10
            "#,
        )
        .bind(&membership_type.name)
        .bind(&membership_type.description)
        .bind(membership_type.price_cents)
        .bind(membership_type.duration.months)
        .bind(membership_type.duration.weeks)
        .bind(membership_type.duration.days)
        .bind(membership_type.kind)
        .bind(membership_type.is_active)
        .bind(membership_type.updated_at)
        .bind(&membership_type.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_type_name_conflict(e, &membership_type.name))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_types(
        &self,
        owner_id: &str,
        filter: &MembershipTypeFilter,
    ) -> DbResult<Vec<MembershipType>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {TYPE_COLUMNS} FROM membership_types WHERE owner_id = "
        ));
        qb.push_bind(owner_id);

        if let Some(active) = filter.is_active {
            qb.push(" AND is_active = ").push_bind(active);
        }
        if let Some(kind) = filter.kind {
            qb.push(" AND kind = ").push_bind(kind);
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            qb.push(" AND name LIKE ")
                .push_bind(like_pattern(search))
                .push(" ESCAPE '\\'");
        }

        qb.push(" ORDER BY price_cents, name");

        let types = qb
            .build_query_as::<MembershipType>()
            .fetch_all(&self.pool)
            .await?;

        Ok(types)
    }

    async fn get_membership(&self, id: &str) -> DbResult<Option<MemberMembership>> {
        let membership = sqlx::query_as::<_, MemberMembership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM member_memberships WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    async fn assign_membership(&self, membership: &MemberMembership) -> DbResult<bool> {
        debug!(
            id = %membership.id,
            member_id = %membership.member_id,
            end_date = %membership.end_date,
            "Assigning membership"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO member_memberships (
                id, owner_id, member_id, membership_type_id, start_date, end_date,
                payment_status, price_cents, notes, paid_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&membership.id)
        .bind(&membership.owner_id)
        .bind(&membership.member_id)
        .bind(&membership.membership_type_id)
        .bind(membership.start_date)
        .bind(membership.end_date)
        .bind(membership.payment_status)
        .bind(membership.price_cents)
        .bind(&membership.notes)
        .bind(membership.paid_at)
        .bind(membership.created_at)
        .bind(membership.updated_at)
        .execute(&mut *tx)
        .await?;

        let linked = sqlx::query(
            "UPDATE members SET active_membership_id = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(&membership.id)
        .bind(membership.created_at)
        .bind(&membership.member_id)
        .execute(&mut *tx)
        .await?;

        if linked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn update_membership(&self, membership: &MemberMembership) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE member_memberships SET
                start_date = ?1,
                end_date = ?2,
                notes = ?3,
                updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(membership.start_date)
        .bind(membership.end_date)
        .bind(&membership.notes)
        .bind(membership.updated_at)
        .bind(&membership.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_paid(&self, id: &str, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE member_memberships SET payment_status = ?1, paid_at = ?2, updated_at = ?2 \
             WHERE id = ?3 AND payment_status = ?4",
        )
        .bind(PaymentStatus::Paid)
        .bind(at)
        .bind(id)
        .bind(PaymentStatus::Unpaid)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_expired(&self, id: &str, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE member_memberships SET payment_status = ?1, updated_at = ?2 \
             WHERE id = ?3 AND payment_status = ?4",
        )
        .bind(PaymentStatus::Unpaid)
        .bind(at)
        .bind(id)
        .bind(PaymentStatus::Paid)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_membership(&self, id: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM member_memberships WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE members SET active_membership_id = NULL, updated_at = ?1 \
             WHERE active_membership_id = ?2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn expired_paid(
        &self,
        today: NaiveDate,
        after: Option<(NaiveDate, &str)>,
        limit: u32,
    ) -> DbResult<Vec<MemberMembership>> {
        let (after_date, after_id) = after.unzip();

        let memberships = sqlx::query_as::<_, MemberMembership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM member_memberships \
             WHERE payment_status = ?1 AND end_date < ?2 \
               AND (?3 IS NULL OR end_date > ?3 OR (end_date = ?3 AND id > ?4)) \
             ORDER BY end_date, id LIMIT ?5"
        ))
        .bind(PaymentStatus::Paid)
        .bind(today)
        .bind(after_date)
        .bind(after_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(memberships)
    }

    async fn memberships_for_member(&self, member_id: &str) -> DbResult<Vec<MemberMembership>> {
        let memberships = sqlx::query_as::<_, MemberMembership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM member_memberships \
             WHERE member_id = ?1 ORDER BY start_date DESC, created_at DESC"
        ))
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(memberships)
    }
}
