//! # Member Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use gym_core::{Member, MemberFilter, Page};

use crate::error::DbResult;
use crate::repository::like_pattern;
use crate::store::MemberStore;

const MEMBER_COLUMNS: &str = "id, owner_id, first_name, last_name, email, phone, is_active, \
     active_membership_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct MemberRepository {
    pool: SqlitePool,
}

impl MemberRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MemberRepository { pool }
    }
}

#[async_trait]
impl MemberStore for MemberRepository {
    async fn get_member(&self, id: &str) -> DbResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }

    async fn insert_member(&self, member: &Member) -> DbResult<()> {
        debug!(id = %member.id, "Inserting member");

        sqlx::query(
            r#"
            INSERT INTO members (
                id, owner_id, first_name, last_name, email, phone, is_active,
                active_membership_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&member.id)
        .bind(&member.owner_id)
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(member.is_active)
        .bind(&member.active_membership_id)
        .bind(member.created_at)
        .bind(member.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_member(&self, member: &Member) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE members SET
                first_name = ?1,
                last_name = ?2,
                email = ?3,
                phone = ?4,
                is_active = ?5,
                updated_at = ?6
            WHERE id = ?7
            "#,
        )
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(member.is_active)
        .bind(member.updated_at)
        .bind(&member.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_member(&self, id: &str) -> DbResult<bool> {
        debug!(id = %id, "Deleting member and memberships");

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM member_memberships WHERE member_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM members WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_members(
        &self,
        owner_id: &str,
        filter: &MemberFilter,
        page: Page,
    ) -> DbResult<Vec<Member>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE owner_id = "
        ));
        qb.push_bind(owner_id);
        push_filter(&mut qb, filter);

        qb.push(" ORDER BY last_name, first_name LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(page.offset));

        let members = qb.build_query_as::<Member>().fetch_all(&self.pool).await?;
        Ok(members)
    }

    async fn count_members(&self, owner_id: &str, filter: &MemberFilter) -> DbResult<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM members WHERE owner_id = ");
        qb.push_bind(owner_id);
        push_filter(&mut qb, filter);

        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn members_created_between(
        &self,
        owner_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members \
             WHERE owner_id = ?1 AND created_at >= ?2 AND created_at < ?3 \
             ORDER BY created_at DESC, id LIMIT ?4"
        ))
        .bind(owner_id)
        .bind(from)
        .bind(to)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &MemberFilter) {
    if let Some(active) = filter.is_active {
        qb.push(" AND is_active = ").push_bind(active);
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        qb.push(" AND created_at < ").push_bind(to);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (first_name || ' ' || last_name LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR email LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}
