//! # Membership Lifecycle Manager
//!
//! Membership types, the instances assigned to members, and expiry.
//!
//! ## Instance Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  assign(start) ──► unpaid ──mark_paid──► paid                          │
//! │     │                                     │                             │
//! │     │ end = start + months                │ end_date < today            │
//! │     │           + 7 × weeks days          │ (check or sweep)            │
//! │     │           + days                    ▼                             │
//! │     │                                   unpaid                          │
//! │     │                                                                   │
//! │     └── end date is computed once and stored; editing the type never   │
//! │         moves it                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use gym_core::membership::{needs_expiry_transition, shift_period};
use gym_core::validation::{
    validate_notes, validate_positive_price, validate_search_query, validate_type_name,
};
use gym_core::{
    new_id, MemberMembership, MembershipPatch, MembershipType, MembershipTypeFilter,
    MembershipTypePatch, NewMembershipType, PaymentStatus,
};
use gym_db::{MemberStore, MembershipStore};

use crate::call::{bounded, ensure_owner};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Outcome of a clean expiration sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired paid instances seen.
    pub examined: usize,
    /// Instances this sweep moved to unpaid.
    pub transitioned: usize,
}

#[derive(Clone)]
pub struct MembershipManager {
    memberships: Arc<dyn MembershipStore>,
    members: Arc<dyn MemberStore>,
    config: EngineConfig,
}

impl MembershipManager {
    pub fn new(
        memberships: Arc<dyn MembershipStore>,
        members: Arc<dyn MemberStore>,
        config: EngineConfig,
    ) -> Self {
        MembershipManager {
            memberships,
            members,
            config,
        }
    }

    // =========================================================================
    // Membership Types
    // =========================================================================

    pub async fn create_type(
        &self,
        owner_id: &str,
        new: NewMembershipType,
    ) -> EngineResult<MembershipType> {
        let name = new.name.trim().to_string();
        validate_type_name(&name)?;
        validate_positive_price("price", new.price_cents)?;
        let duration = new.duration.unwrap_or_else(|| new.kind.default_duration());
        duration.validate()?;

        self.ensure_name_free(owner_id, &name, None).await?;

        let now = Utc::now();
        let membership_type = MembershipType {
            id: new_id(),
            owner_id: owner_id.to_string(),
            name,
            description: trimmed(new.description),
            price_cents: new.price_cents,
            duration,
            kind: new.kind,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        bounded(
            self.config.store_timeout,
            "insert_type",
            self.memberships.insert_type(&membership_type),
        )
        .await?;

        info!(id = %membership_type.id, name = %membership_type.name, duration = %membership_type.duration, "Membership type created");
        Ok(membership_type)
    }

    /// Edits a type. Instances already assigned keep their dates and price.
    pub async fn update_type(
        &self,
        owner_id: &str,
        type_id: &str,
        patch: MembershipTypePatch,
    ) -> EngineResult<MembershipType> {
        let mut membership_type = self.owned_type(owner_id, type_id).await?;

        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            validate_type_name(&name)?;
            if !name.eq_ignore_ascii_case(&membership_type.name) {
                self.ensure_name_free(owner_id, &name, Some(type_id)).await?;
            }
            membership_type.name = name;
        }
        if let Some(description) = patch.description {
            membership_type.description = trimmed(description);
        }
        if let Some(price_cents) = patch.price_cents {
            validate_positive_price("price", price_cents)?;
            membership_type.price_cents = price_cents;
        }
        if let Some(kind) = patch.kind {
            membership_type.kind = kind;
        }
        if let Some(duration) = patch.duration {
            duration.validate()?;
            membership_type.duration = duration;
        }
        membership_type.updated_at = Utc::now();

        self.save_type(&membership_type).await?;
        debug!(id = %type_id, "Membership type updated");
        Ok(membership_type)
    }

    pub async fn set_type_active(
        &self,
        owner_id: &str,
        type_id: &str,
        active: bool,
    ) -> EngineResult<MembershipType> {
        let mut membership_type = self.owned_type(owner_id, type_id).await?;
        if membership_type.is_active == active {
            return Ok(membership_type);
        }
        membership_type.is_active = active;
        membership_type.updated_at = Utc::now();

        self.save_type(&membership_type).await?;
        info!(id = %type_id, active, "Membership type toggled");
        Ok(membership_type)
    }

    pub async fn get_type(&self, owner_id: &str, type_id: &str) -> EngineResult<MembershipType> {
        self.owned_type(owner_id, type_id).await
    }

    pub async fn list_types(
        &self,
        owner_id: &str,
        filter: &MembershipTypeFilter,
    ) -> EngineResult<Vec<MembershipType>> {
        let filter = MembershipTypeFilter {
            search: filter
                .search
                .as_deref()
                .map(validate_search_query)
                .transpose()?,
            ..filter.clone()
        };
        bounded(
            self.config.store_timeout,
            "list_types",
            self.memberships.list_types(owner_id, &filter),
        )
        .await
    }

    async fn owned_type(&self, owner_id: &str, type_id: &str) -> EngineResult<MembershipType> {
        let membership_type = bounded(
            self.config.store_timeout,
            "get_type",
            self.memberships.get_type(type_id),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("MembershipType", type_id))?;
        ensure_owner("MembershipType", type_id, &membership_type.owner_id, owner_id)?;
        Ok(membership_type)
    }

    async fn ensure_name_free(
        &self,
        owner_id: &str,
        name: &str,
        except_id: Option<&str>,
    ) -> EngineResult<()> {
        let existing = bounded(
            self.config.store_timeout,
            "find_type_by_name",
            self.memberships.find_type_by_name(owner_id, name),
        )
        .await?;

        match existing {
            Some(t) if Some(t.id.as_str()) != except_id => Err(EngineError::Duplicate {
                field: "name".to_string(),
                value: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn save_type(&self, membership_type: &MembershipType) -> EngineResult<()> {
        let updated = bounded(
            self.config.store_timeout,
            "update_type",
            self.memberships.update_type(membership_type),
        )
        .await?;
        if !updated {
            return Err(EngineError::not_found("MembershipType", &membership_type.id));
        }
        Ok(())
    }

    // =========================================================================
    // Instances
    // =========================================================================

    /// Assigns a membership of `type_id` to a member, starting on `start_date`.
    ///
    /// The instance is created unpaid with the type's current price, and the
    /// member's back-reference points at it.
    pub async fn assign(
        &self,
        owner_id: &str,
        member_id: &str,
        type_id: &str,
        start_date: NaiveDate,
    ) -> EngineResult<MemberMembership> {
        let timeout = self.config.store_timeout;

        let membership_type = self.owned_type(owner_id, type_id).await?;
        if !membership_type.is_active {
            return Err(EngineError::InactiveMembershipType {
                type_id: type_id.to_string(),
            });
        }

        let member = bounded(timeout, "get_member", self.members.get_member(member_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Member", member_id))?;
        ensure_owner("Member", member_id, &member.owner_id, owner_id)?;

        let end_date = membership_type.duration.end_date(start_date)?;

        let now = Utc::now();
        let membership = MemberMembership {
            id: new_id(),
            owner_id: owner_id.to_string(),
            member_id: member.id.clone(),
            membership_type_id: membership_type.id.clone(),
            start_date,
            end_date,
            payment_status: PaymentStatus::Unpaid,
            price_cents: membership_type.price_cents,
            notes: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };

        let linked = bounded(
            timeout,
            "assign_membership",
            self.memberships.assign_membership(&membership),
        )
        .await?;
        if !linked {
            return Err(EngineError::not_found("Member", member_id));
        }

        info!(
            id = %membership.id,
            member_id,
            type_id,
            start = %membership.start_date,
            end = %membership.end_date,
            "Membership assigned"
        );
        Ok(membership)
    }

    /// Marks an instance paid. Paying a paid instance changes nothing.
    pub async fn mark_paid(&self, owner_id: &str, id: &str) -> EngineResult<MemberMembership> {
        let membership = self.owned_membership(owner_id, id).await?;
        if membership.payment_status == PaymentStatus::Paid {
            return Ok(membership);
        }

        let changed = bounded(
            self.config.store_timeout,
            "mark_paid",
            self.memberships.mark_paid(id, Utc::now()),
        )
        .await?;
        if changed {
            info!(id, "Membership paid");
        }

        self.require_membership(id).await
    }

    /// Manual edit of notes and/or the start date.
    ///
    /// A new start date moves the end date by the same number of days, so
    /// the stored length is kept regardless of later type edits.
    pub async fn update_membership(
        &self,
        owner_id: &str,
        id: &str,
        patch: MembershipPatch,
    ) -> EngineResult<MemberMembership> {
        let mut membership = self.owned_membership(owner_id, id).await?;

        if let Some(notes) = patch.notes {
            let notes = trimmed(notes);
            validate_notes(notes.as_deref())?;
            membership.notes = notes;
        }
        if let Some(start_date) = patch.start_date {
            membership.end_date =
                shift_period(membership.start_date, membership.end_date, start_date)?;
            membership.start_date = start_date;
        }
        membership.updated_at = Utc::now();

        let updated = bounded(
            self.config.store_timeout,
            "update_membership",
            self.memberships.update_membership(&membership),
        )
        .await?;
        if !updated {
            return Err(EngineError::not_found("MemberMembership", id));
        }
        Ok(membership)
    }

    /// Removes an instance and clears the member's back-reference to it.
    pub async fn delete_membership(&self, owner_id: &str, id: &str) -> EngineResult<()> {
        self.owned_membership(owner_id, id).await?;

        let deleted = bounded(
            self.config.store_timeout,
            "delete_membership",
            self.memberships.delete_membership(id),
        )
        .await?;
        if !deleted {
            return Err(EngineError::not_found("MemberMembership", id));
        }

        info!(id, "Membership deleted");
        Ok(())
    }

    pub async fn get_membership(&self, owner_id: &str, id: &str) -> EngineResult<MemberMembership> {
        self.owned_membership(owner_id, id).await
    }

    /// On-demand expiry check: an expired paid instance becomes unpaid.
    pub async fn check_membership(
        &self,
        owner_id: &str,
        id: &str,
        today: NaiveDate,
    ) -> EngineResult<MemberMembership> {
        let membership = self.owned_membership(owner_id, id).await?;
        if !needs_expiry_transition(membership.payment_status, membership.end_date, today) {
            return Ok(membership);
        }

        let changed = bounded(
            self.config.store_timeout,
            "mark_expired",
            self.memberships.mark_expired(id, Utc::now()),
        )
        .await?;
        if changed {
            info!(id, end = %membership.end_date, "Membership expired");
        }

        self.require_membership(id).await
    }

    /// Moves every paid instance whose end date is before `today` to unpaid.
    ///
    /// Transitions are independent: one failure does not stop the rest, and
    /// failures are reported together as `PartialFailure`. Running the sweep
    /// again with the same `today` transitions nothing.
    pub async fn sweep_expirations(&self, today: NaiveDate) -> EngineResult<SweepReport> {
        let timeout = self.config.store_timeout;
        let limit = self.config.sweep_batch_size;
        let mut report = SweepReport::default();
        let mut failed: Vec<String> = Vec::new();
        let mut cursor: Option<(NaiveDate, String)> = None;

        loop {
            let after = cursor.as_ref().map(|(date, id)| (*date, id.as_str()));
            let batch = bounded(
                timeout,
                "expired_paid",
                self.memberships.expired_paid(today, after, limit),
            )
            .await?;

            let exhausted = batch.len() < limit as usize;
            if let Some(last) = batch.last() {
                cursor = Some((last.end_date, last.id.clone()));
            }

            for membership in batch {
                report.examined += 1;

                let result = bounded(
                    timeout,
                    "mark_expired",
                    self.memberships.mark_expired(&membership.id, Utc::now()),
                )
                .await;
                match result {
                    Ok(true) => report.transitioned += 1,
                    Ok(false) => debug!(id = %membership.id, "Membership already transitioned"),
                    Err(err) => {
                        error!(id = %membership.id, error = %err, "Failed to expire membership");
                        failed.push(membership.id);
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        info!(
            %today,
            examined = report.examined,
            transitioned = report.transitioned,
            failed = failed.len(),
            "Expiration sweep finished"
        );

        if !failed.is_empty() {
            return Err(EngineError::PartialFailure {
                succeeded: report.transitioned,
                failed,
            });
        }
        Ok(report)
    }

    async fn owned_membership(&self, owner_id: &str, id: &str) -> EngineResult<MemberMembership> {
        let membership = self.require_membership(id).await?;
        ensure_owner("MemberMembership", id, &membership.owner_id, owner_id)?;
        Ok(membership)
    }

    async fn require_membership(&self, id: &str) -> EngineResult<MemberMembership> {
        bounded(
            self.config.store_timeout,
            "get_membership",
            self.memberships.get_membership(id),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("MemberMembership", id))
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
