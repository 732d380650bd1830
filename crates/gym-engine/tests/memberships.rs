//! Membership lifecycle: assignment, payment, expiry.

mod common;

use chrono::NaiveDate;

use gym_core::{
    DurationDescriptor, MembershipKind, MembershipPatch, MembershipTypeFilter, MembershipTypePatch,
    NewMembershipType, PaymentStatus,
};
use gym_engine::{EngineError, ErrorCode};

use common::{
    member, monthly_type, setup, setup_with_membership_faults, test_config, OTHER_OWNER, OWNER,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_assign_computes_end_date_and_snapshots_price() {
    let (_db, engine) = setup().await;
    let alice = member(&engine, "Alice").await;
    let monthly = monthly_type(&engine, "Monthly").await;

    let membership = engine
        .memberships
        .assign(OWNER, &alice.id, &monthly.id, date(2024, 1, 15))
        .await
        .unwrap();

    assert_eq!(membership.start_date, date(2024, 1, 15));
    assert_eq!(membership.end_date, date(2024, 2, 15));
    assert_eq!(membership.payment_status, PaymentStatus::Unpaid);
    assert_eq!(membership.price_cents, 60000);

    let alice = engine.members.get_member(OWNER, &alice.id).await.unwrap();
    assert_eq!(alice.active_membership_id.as_deref(), Some(membership.id.as_str()));
}

#[tokio::test]
async fn test_month_end_clamps_and_components_apply_in_order() {
    let (_db, engine) = setup().await;
    let bob = member(&engine, "Bob").await;
    let mixed = engine
        .memberships
        .create_type(
            OWNER,
            NewMembershipType {
                name: "Month plus".to_string(),
                description: None,
                price_cents: 70000,
                kind: MembershipKind::Monthly,
                duration: Some(DurationDescriptor::new(1, 1, 2)),
            },
        )
        .await
        .unwrap();

    let membership = engine
        .memberships
        .assign(OWNER, &bob.id, &mixed.id, date(2024, 1, 31))
        .await
        .unwrap();
    assert_eq!(membership.end_date, date(2024, 3, 9));
}

#[tokio::test]
async fn test_type_edits_do_not_touch_assigned_instances() {
    let (_db, engine) = setup().await;
    let alice = member(&engine, "Alice").await;
    let monthly = monthly_type(&engine, "Monthly").await;

    let membership = engine
        .memberships
        .assign(OWNER, &alice.id, &monthly.id, date(2024, 1, 15))
        .await
        .unwrap();

    let edited = engine
        .memberships
        .update_type(
            OWNER,
            &monthly.id,
            MembershipTypePatch {
                price_cents: Some(80000),
                duration: Some(DurationDescriptor::new(3, 0, 0)),
                ..MembershipTypePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.duration, DurationDescriptor::new(3, 0, 0));

    let stored = engine
        .memberships
        .get_membership(OWNER, &membership.id)
        .await
        .unwrap();
    assert_eq!(stored.end_date, date(2024, 2, 15));
    assert_eq!(stored.price_cents, 60000);
}

#[tokio::test]
async fn test_sweep_expires_paid_instances_once() {
    let (_db, engine) = setup().await;
    let alice = member(&engine, "Alice").await;
    let bob = member(&engine, "Bob").await;
    let monthly = monthly_type(&engine, "Monthly").await;

    let expired = engine
        .memberships
        .assign(OWNER, &alice.id, &monthly.id, date(2024, 1, 28))
        .await
        .unwrap();
    assert_eq!(expired.end_date, date(2024, 2, 28));
    engine.memberships.mark_paid(OWNER, &expired.id).await.unwrap();

    let current = engine
        .memberships
        .assign(OWNER, &bob.id, &monthly.id, date(2024, 2, 20))
        .await
        .unwrap();
    engine.memberships.mark_paid(OWNER, &current.id).await.unwrap();

    let report = engine
        .memberships
        .sweep_expirations(date(2024, 3, 1))
        .await
        .unwrap();
    assert_eq!(report.transitioned, 1);

    let stored = engine
        .memberships
        .get_membership(OWNER, &expired.id)
        .await
        .unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Unpaid);

    let untouched = engine
        .memberships
        .get_membership(OWNER, &current.id)
        .await
        .unwrap();
    assert_eq!(untouched.payment_status, PaymentStatus::Paid);

    let again = engine
        .memberships
        .sweep_expirations(date(2024, 3, 1))
        .await
        .unwrap();
    assert_eq!(again.transitioned, 0);
}

/// Three paid monthly memberships that ended in February, oldest first.
async fn three_lapsed(engine: &gym_engine::Engine) -> Vec<String> {
    let monthly = monthly_type(engine, "Monthly").await;
    let mut ids = Vec::new();
    for (name, day) in [("Alice", 1), ("Bob", 5), ("Carla", 10)] {
        let holder = member(engine, name).await;
        let membership = engine
            .memberships
            .assign(OWNER, &holder.id, &monthly.id, date(2024, 1, day))
            .await
            .unwrap();
        engine.memberships.mark_paid(OWNER, &membership.id).await.unwrap();
        ids.push(membership.id);
    }
    ids
}

#[tokio::test]
async fn test_sweep_moves_past_failures_filling_a_batch() {
    let (_db, engine, faults) = setup_with_membership_faults(test_config().sweep_batch_size(1)).await;
    let ids = three_lapsed(&engine).await;
    faults.fail_expiry(&ids[0]);
    faults.fail_expiry(&ids[1]);

    let err = engine
        .memberships
        .sweep_expirations(date(2024, 3, 1))
        .await
        .unwrap_err();
    match err {
        EngineError::PartialFailure { succeeded, failed } => {
            assert_eq!(succeeded, 1);
            assert_eq!(failed, vec![ids[0].clone(), ids[1].clone()]);
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }

    let last = engine.memberships.get_membership(OWNER, &ids[2]).await.unwrap();
    assert_eq!(last.payment_status, PaymentStatus::Unpaid);
    let stuck = engine.memberships.get_membership(OWNER, &ids[0]).await.unwrap();
    assert_eq!(stuck.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_sweep_reports_single_failure() {
    let (_db, engine, faults) = setup_with_membership_faults(test_config().sweep_batch_size(2)).await;
    let ids = three_lapsed(&engine).await;
    faults.fail_expiry(&ids[0]);

    let err = engine
        .memberships
        .sweep_expirations(date(2024, 3, 1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PartialFailure);
    assert!(matches!(
        err,
        EngineError::PartialFailure { succeeded: 2, ref failed } if failed == &vec![ids[0].clone()]
    ));

    for id in &ids[1..] {
        let swept = engine.memberships.get_membership(OWNER, id).await.unwrap();
        assert_eq!(swept.payment_status, PaymentStatus::Unpaid);
    }
}

#[tokio::test]
async fn test_end_date_is_still_valid() {
    let (_db, engine) = setup().await;
    let alice = member(&engine, "Alice").await;
    let monthly = monthly_type(&engine, "Monthly").await;

    let membership = engine
        .memberships
        .assign(OWNER, &alice.id, &monthly.id, date(2024, 1, 28))
        .await
        .unwrap();
    engine.memberships.mark_paid(OWNER, &membership.id).await.unwrap();

    let on_end = engine
        .memberships
        .sweep_expirations(date(2024, 2, 28))
        .await
        .unwrap();
    assert_eq!(on_end.transitioned, 0);

    let checked = engine
        .memberships
        .check_membership(OWNER, &membership.id, date(2024, 2, 28))
        .await
        .unwrap();
    assert_eq!(checked.payment_status, PaymentStatus::Paid);

    let checked = engine
        .memberships
        .check_membership(OWNER, &membership.id, date(2024, 2, 29))
        .await
        .unwrap();
    assert_eq!(checked.payment_status, PaymentStatus::Unpaid);
}

#[tokio::test]
async fn test_inactive_type_cannot_be_assigned() {
    let (_db, engine) = setup().await;
    let alice = member(&engine, "Alice").await;
    let monthly = monthly_type(&engine, "Monthly").await;

    engine
        .memberships
        .set_type_active(OWNER, &monthly.id, false)
        .await
        .unwrap();

    let err = engine
        .memberships
        .assign(OWNER, &alice.id, &monthly.id, date(2024, 1, 15))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InactiveMembershipType);

    let active = MembershipTypeFilter {
        is_active: Some(true),
        ..MembershipTypeFilter::default()
    };
    let listed = engine.memberships.list_types(OWNER, &active).await.unwrap();
    assert!(listed.is_empty());
    let all = engine
        .memberships
        .list_types(OWNER, &MembershipTypeFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_list_types_by_name_and_kind() {
    let (_db, engine) = setup().await;
    monthly_type(&engine, "Monthly basic").await;
    monthly_type(&engine, "Monthly premium").await;
    let weekly = engine
        .memberships
        .create_type(
            OWNER,
            NewMembershipType {
                name: "Weekly pass".to_string(),
                description: None,
                price_cents: 20000,
                kind: MembershipKind::Weekly,
                duration: None,
            },
        )
        .await
        .unwrap();

    let premium = engine
        .memberships
        .list_types(
            OWNER,
            &MembershipTypeFilter {
                search: Some("PREM".to_string()),
                ..MembershipTypeFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(premium.len(), 1);
    assert_eq!(premium[0].name, "Monthly premium");

    let weekly_only = engine
        .memberships
        .list_types(
            OWNER,
            &MembershipTypeFilter {
                kind: Some(MembershipKind::Weekly),
                ..MembershipTypeFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(weekly_only.len(), 1);
    assert_eq!(weekly_only[0].id, weekly.id);

    let theirs = engine
        .memberships
        .list_types(OTHER_OWNER, &MembershipTypeFilter::default())
        .await
        .unwrap();
    assert!(theirs.is_empty());
}

#[tokio::test]
async fn test_mark_paid_is_idempotent() {
    let (_db, engine) = setup().await;
    let alice = member(&engine, "Alice").await;
    let monthly = monthly_type(&engine, "Monthly").await;

    let membership = engine
        .memberships
        .assign(OWNER, &alice.id, &monthly.id, date(2024, 1, 15))
        .await
        .unwrap();

    let paid = engine.memberships.mark_paid(OWNER, &membership.id).await.unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert!(paid.paid_at.is_some());

    let again = engine.memberships.mark_paid(OWNER, &membership.id).await.unwrap();
    assert_eq!(again.payment_status, PaymentStatus::Paid);
    assert_eq!(again.paid_at, paid.paid_at);
}

#[tokio::test]
async fn test_start_date_edit_shifts_end_date() {
    let (_db, engine) = setup().await;
    let alice = member(&engine, "Alice").await;
    let monthly = monthly_type(&engine, "Monthly").await;

    let membership = engine
        .memberships
        .assign(OWNER, &alice.id, &monthly.id, date(2024, 1, 15))
        .await
        .unwrap();

    let moved = engine
        .memberships
        .update_membership(
            OWNER,
            &membership.id,
            MembershipPatch {
                notes: Some(Some(" moved after injury ".to_string())),
                start_date: Some(date(2024, 1, 25)),
            },
        )
        .await
        .unwrap();

    assert_eq!(moved.start_date, date(2024, 1, 25));
    assert_eq!(moved.end_date, date(2024, 2, 25));
    assert_eq!(moved.notes.as_deref(), Some("moved after injury"));
}

#[tokio::test]
async fn test_delete_membership_clears_member_reference() {
    let (_db, engine) = setup().await;
    let alice = member(&engine, "Alice").await;
    let monthly = monthly_type(&engine, "Monthly").await;

    let membership = engine
        .memberships
        .assign(OWNER, &alice.id, &monthly.id, date(2024, 1, 15))
        .await
        .unwrap();

    engine
        .memberships
        .delete_membership(OWNER, &membership.id)
        .await
        .unwrap();

    let alice = engine.members.get_member(OWNER, &alice.id).await.unwrap();
    assert_eq!(alice.active_membership_id, None);

    let err = engine
        .memberships
        .get_membership(OWNER, &membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_member_history_and_cascade_delete() {
    let (_db, engine) = setup().await;
    let alice = member(&engine, "Alice").await;
    let monthly = monthly_type(&engine, "Monthly").await;

    let first = engine
        .memberships
        .assign(OWNER, &alice.id, &monthly.id, date(2024, 1, 1))
        .await
        .unwrap();
    let second = engine
        .memberships
        .assign(OWNER, &alice.id, &monthly.id, date(2024, 2, 1))
        .await
        .unwrap();

    let history = engine
        .members
        .memberships_for_member(OWNER, &alice.id)
        .await
        .unwrap();
    let ids: Vec<&str> = history.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);

    engine.members.delete_member(OWNER, &alice.id).await.unwrap();
    let err = engine
        .memberships
        .get_membership(OWNER, &first.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_type_validation_and_duplicates() {
    let (_db, engine) = setup().await;
    monthly_type(&engine, "Monthly").await;

    let duplicate = engine
        .memberships
        .create_type(
            OWNER,
            NewMembershipType {
                name: "  monthly ".to_string(),
                description: None,
                price_cents: 50000,
                kind: MembershipKind::Monthly,
                duration: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(duplicate.code(), ErrorCode::Duplicate);

    let zero = engine
        .memberships
        .create_type(
            OWNER,
            NewMembershipType {
                name: "Nothing".to_string(),
                description: None,
                price_cents: 50000,
                kind: MembershipKind::Days,
                duration: Some(DurationDescriptor::new(0, 0, 0)),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(zero.code(), ErrorCode::InvalidDuration);

    let free = engine
        .memberships
        .create_type(
            OWNER,
            NewMembershipType {
                name: "Free".to_string(),
                description: None,
                price_cents: 0,
                kind: MembershipKind::Weekly,
                duration: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(free.code(), ErrorCode::ValidationError);

    // Another owner may reuse the name.
    let theirs = engine
        .memberships
        .create_type(
            OTHER_OWNER,
            NewMembershipType {
                name: "Monthly".to_string(),
                description: None,
                price_cents: 50000,
                kind: MembershipKind::Monthly,
                duration: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(theirs.duration, DurationDescriptor::new(1, 0, 0));
}

#[tokio::test]
async fn test_foreign_owner_is_forbidden() {
    let (_db, engine) = setup().await;
    let alice = member(&engine, "Alice").await;
    let monthly = monthly_type(&engine, "Monthly").await;

    let err = engine
        .memberships
        .assign(OTHER_OWNER, &alice.id, &monthly.id, date(2024, 1, 15))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let membership = engine
        .memberships
        .assign(OWNER, &alice.id, &monthly.id, date(2024, 1, 15))
        .await
        .unwrap();
    let err = engine
        .memberships
        .mark_paid(OTHER_OWNER, &membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
}
