//! # Members Admin

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::info;

use gym_core::validation::{validate_email, validate_name, validate_search_query};
use gym_core::{
    new_id, Member, MemberFilter, MemberMembership, MemberPatch, NewMember, Page, ValidationError,
};
use gym_db::{MemberStore, MembershipStore};

use crate::call::{bounded, ensure_owner};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

#[derive(Clone)]
pub struct MemberService {
    members: Arc<dyn MemberStore>,
    memberships: Arc<dyn MembershipStore>,
    config: EngineConfig,
}

impl MemberService {
    pub fn new(
        members: Arc<dyn MemberStore>,
        memberships: Arc<dyn MembershipStore>,
        config: EngineConfig,
    ) -> Self {
        MemberService {
            members,
            memberships,
            config,
        }
    }

    pub async fn create_member(&self, owner_id: &str, new: NewMember) -> EngineResult<Member> {
        let first_name = new.first_name.trim().to_string();
        let last_name = new.last_name.trim().to_string();
        let email = trimmed(new.email);
        validate_name("first_name", &first_name)?;
        validate_name("last_name", &last_name)?;
        validate_email(email.as_deref())?;

        let now = Utc::now();
        let member = Member {
            id: new_id(),
            owner_id: owner_id.to_string(),
            first_name,
            last_name,
            email,
            phone: trimmed(new.phone),
            is_active: true,
            active_membership_id: None,
            created_at: now,
            updated_at: now,
        };
        bounded(
            self.config.store_timeout,
            "insert_member",
            self.members.insert_member(&member),
        )
        .await?;

        info!(id = %member.id, name = %member.full_name(), "Member created");
        Ok(member)
    }

    pub async fn update_member(
        &self,
        owner_id: &str,
        member_id: &str,
        patch: MemberPatch,
    ) -> EngineResult<Member> {
        let mut member = self.owned_member(owner_id, member_id).await?;

        if let Some(first_name) = patch.first_name {
            let first_name = first_name.trim().to_string();
            validate_name("first_name", &first_name)?;
            member.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            let last_name = last_name.trim().to_string();
            validate_name("last_name", &last_name)?;
            member.last_name = last_name;
        }
        if let Some(email) = patch.email {
            let email = trimmed(email);
            validate_email(email.as_deref())?;
            member.email = email;
        }
        if let Some(phone) = patch.phone {
            member.phone = trimmed(phone);
        }
        member.updated_at = Utc::now();

        self.save(&member).await?;
        Ok(member)
    }

    pub async fn set_member_active(
        &self,
        owner_id: &str,
        member_id: &str,
        active: bool,
    ) -> EngineResult<Member> {
        let mut member = self.owned_member(owner_id, member_id).await?;
        if member.is_active == active {
            return Ok(member);
        }
        member.is_active = active;
        member.updated_at = Utc::now();

        self.save(&member).await?;
        info!(id = %member_id, active, "Member toggled");
        Ok(member)
    }

    /// Deletes the member together with their membership instances.
    pub async fn delete_member(&self, owner_id: &str, member_id: &str) -> EngineResult<()> {
        self.owned_member(owner_id, member_id).await?;

        let deleted = bounded(
            self.config.store_timeout,
            "delete_member",
            self.members.delete_member(member_id),
        )
        .await?;
        if !deleted {
            return Err(EngineError::not_found("Member", member_id));
        }

        info!(id = %member_id, "Member deleted");
        Ok(())
    }

    pub async fn get_member(&self, owner_id: &str, member_id: &str) -> EngineResult<Member> {
        self.owned_member(owner_id, member_id).await
    }

    pub async fn list_members(
        &self,
        owner_id: &str,
        filter: &MemberFilter,
        page: Page,
    ) -> EngineResult<Vec<Member>> {
        let filter = checked_filter(filter)?;
        bounded(
            self.config.store_timeout,
            "list_members",
            self.members.list_members(owner_id, &filter, page),
        )
        .await
    }

    pub async fn count_members(&self, owner_id: &str, filter: &MemberFilter) -> EngineResult<u64> {
        let filter = checked_filter(filter)?;
        bounded(
            self.config.store_timeout,
            "count_members",
            self.members.count_members(owner_id, &filter),
        )
        .await
    }

    /// Members who joined on `day` (UTC), newest first.
    pub async fn members_joined_on(
        &self,
        owner_id: &str,
        day: NaiveDate,
        limit: u32,
    ) -> EngineResult<Vec<Member>> {
        let from = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
        let to = day
            .succ_opt()
            .map(|next| Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN)))
            .ok_or_else(|| {
                EngineError::Validation(ValidationError::InvalidFormat {
                    field: "day".to_string(),
                    reason: "out of range".to_string(),
                })
            })?;

        bounded(
            self.config.store_timeout,
            "members_created_between",
            self.members
                .members_created_between(owner_id, from, to, limit.clamp(1, Page::MAX_LIMIT)),
        )
        .await
    }

    /// A member's membership instances, newest start date first.
    pub async fn memberships_for_member(
        &self,
        owner_id: &str,
        member_id: &str,
    ) -> EngineResult<Vec<MemberMembership>> {
        self.owned_member(owner_id, member_id).await?;
        bounded(
            self.config.store_timeout,
            "memberships_for_member",
            self.memberships.memberships_for_member(member_id),
        )
        .await
    }

    async fn owned_member(&self, owner_id: &str, member_id: &str) -> EngineResult<Member> {
        let member = bounded(
            self.config.store_timeout,
            "get_member",
            self.members.get_member(member_id),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("Member", member_id))?;
        ensure_owner("Member", member_id, &member.owner_id, owner_id)?;
        Ok(member)
    }

    async fn save(&self, member: &Member) -> EngineResult<()> {
        let updated = bounded(
            self.config.store_timeout,
            "update_member",
            self.members.update_member(member),
        )
        .await?;
        if !updated {
            return Err(EngineError::not_found("Member", &member.id));
        }
        Ok(())
    }
}

fn checked_filter(filter: &MemberFilter) -> EngineResult<MemberFilter> {
    Ok(MemberFilter {
        search: filter
            .search
            .as_deref()
            .map(validate_search_query)
            .transpose()?,
        ..filter.clone()
    })
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
