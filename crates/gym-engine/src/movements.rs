//! # Cash Movements
//!
//! Manual income and expense entries, and the concept catalog offered when
//! recording them. Sale-driven movements are written by the sale processor
//! in the same store call as the status change; they carry a reference and
//! cannot be edited or deleted here.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use gym_core::validation::{
    validate_movement_amount, validate_name, validate_notes, validate_type_name,
};
use gym_core::{
    new_id, CashMovement, MovementConcept, MovementFilter, MovementKind, MovementPatch,
    NewCashMovement, NewMovementConcept, Page, ValidationError,
};
use gym_db::MovementStore;

use crate::call::{bounded, ensure_owner};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

#[derive(Clone)]
pub struct MovementService {
    movements: Arc<dyn MovementStore>,
    config: EngineConfig,
}

impl MovementService {
    pub fn new(movements: Arc<dyn MovementStore>, config: EngineConfig) -> Self {
        MovementService { movements, config }
    }

    pub async fn record_movement(
        &self,
        owner_id: &str,
        new: NewCashMovement,
    ) -> EngineResult<CashMovement> {
        let concept = new.concept.trim().to_string();
        validate_name("concept", &concept)?;
        validate_movement_amount(new.amount_cents)?;
        validate_notes(new.notes.as_deref())?;

        let movement = CashMovement {
            id: new_id(),
            owner_id: owner_id.to_string(),
            kind: new.kind,
            concept,
            amount_cents: new.amount_cents,
            payment_method: new.payment_method,
            notes: new.notes.filter(|n| !n.trim().is_empty()),
            reference_table: None,
            reference_id: None,
            created_at: Utc::now(),
        };
        bounded(
            self.config.store_timeout,
            "insert_movement",
            self.movements.insert_movement(&movement),
        )
        .await?;

        info!(id = %movement.id, kind = ?movement.kind, amount = movement.amount_cents, "Cash movement recorded");
        Ok(movement)
    }

    pub async fn list_movements(
        &self,
        owner_id: &str,
        filter: &MovementFilter,
        page: Page,
    ) -> EngineResult<Vec<CashMovement>> {
        bounded(
            self.config.store_timeout,
            "list_movements",
            self.movements.list_movements(owner_id, filter, page),
        )
        .await
    }

    /// Edits a manual movement.
    pub async fn update_movement(
        &self,
        owner_id: &str,
        id: &str,
        patch: MovementPatch,
    ) -> EngineResult<CashMovement> {
        let mut movement = self.manual_movement(owner_id, id).await?;

        if let Some(kind) = patch.kind {
            movement.kind = kind;
        }
        if let Some(concept) = patch.concept {
            let concept = concept.trim().to_string();
            validate_name("concept", &concept)?;
            movement.concept = concept;
        }
        if let Some(amount_cents) = patch.amount_cents {
            validate_movement_amount(amount_cents)?;
            movement.amount_cents = amount_cents;
        }
        if let Some(payment_method) = patch.payment_method {
            movement.payment_method = payment_method;
        }
        if let Some(notes) = patch.notes {
            validate_notes(notes.as_deref())?;
            movement.notes = notes.filter(|n| !n.trim().is_empty());
        }

        let updated = bounded(
            self.config.store_timeout,
            "update_movement",
            self.movements.update_movement(&movement),
        )
        .await?;
        if !updated {
            return Err(EngineError::not_found("CashMovement", id));
        }

        info!(id, kind = ?movement.kind, amount = movement.amount_cents, "Cash movement updated");
        Ok(movement)
    }

    pub async fn delete_movement(&self, owner_id: &str, id: &str) -> EngineResult<()> {
        self.manual_movement(owner_id, id).await?;

        let deleted = bounded(
            self.config.store_timeout,
            "delete_movement",
            self.movements.delete_movement(id),
        )
        .await?;
        if !deleted {
            return Err(EngineError::not_found("CashMovement", id));
        }

        info!(id, "Cash movement deleted");
        Ok(())
    }

    pub async fn get_movement(&self, owner_id: &str, id: &str) -> EngineResult<CashMovement> {
        let movement = bounded(
            self.config.store_timeout,
            "get_movement",
            self.movements.get_movement(id),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("CashMovement", id))?;
        ensure_owner("CashMovement", id, &movement.owner_id, owner_id)?;
        Ok(movement)
    }

    /// An owned movement that no other record refers to.
    async fn manual_movement(&self, owner_id: &str, id: &str) -> EngineResult<CashMovement> {
        let movement = self.get_movement(owner_id, id).await?;
        if let Some(table) = &movement.reference_table {
            return Err(EngineError::Validation(ValidationError::InvalidFormat {
                field: "movement".to_string(),
                reason: format!("recorded by {table}, change it through its source"),
            }));
        }
        Ok(movement)
    }

    // =========================================================================
    // Concepts
    // =========================================================================

    /// Adds a concept to the owner's catalog. Names are unique per owner,
    /// ignoring case.
    pub async fn create_concept(
        &self,
        owner_id: &str,
        new: NewMovementConcept,
    ) -> EngineResult<MovementConcept> {
        let name = new.name.trim().to_string();
        validate_type_name(&name)?;

        let concept = MovementConcept {
            id: new_id(),
            owner_id: owner_id.to_string(),
            name,
            kind: new.kind,
            is_active: true,
            created_at: Utc::now(),
        };
        bounded(
            self.config.store_timeout,
            "insert_concept",
            self.movements.insert_concept(&concept),
        )
        .await?;

        info!(id = %concept.id, name = %concept.name, kind = ?concept.kind, "Movement concept created");
        Ok(concept)
    }

    /// Active concepts ordered by name.
    pub async fn list_concepts(
        &self,
        owner_id: &str,
        kind: Option<MovementKind>,
    ) -> EngineResult<Vec<MovementConcept>> {
        bounded(
            self.config.store_timeout,
            "list_concepts",
            self.movements.list_concepts(owner_id, kind),
        )
        .await
    }

    /// Movements recorded against a record, e.g. `("sales", sale_id)`.
    pub async fn movements_for_reference(
        &self,
        owner_id: &str,
        reference_table: &str,
        reference_id: &str,
    ) -> EngineResult<Vec<CashMovement>> {
        let movements = bounded(
            self.config.store_timeout,
            "movements_for_reference",
            self.movements
                .movements_for_reference(reference_table, reference_id),
        )
        .await?;

        Ok(movements
            .into_iter()
            .filter(|m| m.owner_id == owner_id)
            .collect())
    }
}
