//! Recovery of sales left in a pending, reverting or cancelling state.

mod common;

use chrono::{Duration, Utc};

use gym_core::sale::{sale_line_key, sale_number};
use gym_core::{
    new_id, DeltaPolicy, MovementKind, NewSaleItem, PaymentMethod, Sale, SaleFilter, SaleItem,
    SaleStatus, StockReason,
};
use gym_db::{SaleStore, SaleTransition};
use gym_engine::{DeltaOptions, NewSale};

use common::{product, setup, setup_with_faults, setup_with_gate, stock_of, Fault, OWNER};

fn soon() -> chrono::DateTime<Utc> {
    Utc::now() + Duration::seconds(1)
}

fn pending_sale(product_id: &str, quantity: i64, unit_price_cents: i64) -> Sale {
    pending_sale_of(&[(product_id, quantity, unit_price_cents)])
}

/// A pending sale with one line per `(product, quantity, unit price)`.
fn pending_sale_of(lines: &[(&str, i64, i64)]) -> Sale {
    let id = new_id();
    let now = Utc::now();
    let items: Vec<SaleItem> = lines
        .iter()
        .enumerate()
        .map(|(i, (product_id, quantity, unit_price_cents))| SaleItem {
            sale_id: id.clone(),
            line_no: i as u32 + 1,
            product_id: product_id.to_string(),
            code_snapshot: "P".to_string(),
            name_snapshot: "P item".to_string(),
            quantity: *quantity,
            unit_price_cents: *unit_price_cents,
            subtotal_cents: quantity * unit_price_cents,
        })
        .collect();
    Sale {
        id: id.clone(),
        owner_id: OWNER.to_string(),
        number: sale_number(now.date_naive(), &id),
        status: SaleStatus::Pending,
        total_cents: items.iter().map(|item| item.subtotal_cents).sum(),
        payment_method: PaymentMethod::Cash,
        notes: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
        cancelled_at: None,
        items,
    }
}

fn line_options(sale: &Sale, line_no: u32) -> DeltaOptions {
    DeltaOptions::for_sale(
        &sale.id,
        sale_line_key(&sale.id, line_no),
        StockReason::Sale,
        DeltaPolicy::Strict,
    )
}

#[tokio::test]
async fn test_half_applied_sale_is_rolled_back() {
    let (_db, engine, faults) = setup_with_faults().await;
    let p = product(&engine, "P", 10, 1000).await;
    let q = product(&engine, "Q", 10, 500).await;

    faults.inject(Fault::FailWrite {
        key_suffix: ":2:sale".into(),
    });
    faults.inject(Fault::FailWrite {
        key_suffix: ":reversal".into(),
    });

    engine
        .sales
        .create_sale(
            OWNER,
            NewSale::new(vec![
                NewSaleItem::new(&p.id, 3, 1000),
                NewSaleItem::new(&q.id, 2, 500),
            ]),
        )
        .await
        .unwrap_err();
    assert_eq!(stock_of(&engine, &p.id).await, 7);

    faults.clear();
    let report = engine.reconciler.reconcile_before(soon()).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.examined, 1);
    assert_eq!(report.cancelled.len(), 1);
    assert!(report.completed.is_empty());

    assert_eq!(stock_of(&engine, &p.id).await, 10);
    assert_eq!(stock_of(&engine, &q.id).await, 10);

    let sale = engine.sales.get_sale(OWNER, &report.cancelled[0]).await.unwrap();
    assert_eq!(sale.status, SaleStatus::Cancelled);

    let movements = engine
        .movements
        .movements_for_reference(OWNER, "sales", &sale.id)
        .await
        .unwrap();
    assert!(movements.is_empty());

    let again = engine.reconciler.reconcile_before(soon()).await.unwrap();
    assert_eq!(again.examined, 0);
    assert_eq!(stock_of(&engine, &p.id).await, 10);
}

#[tokio::test]
async fn test_fully_applied_pending_sale_is_completed() {
    let (db, engine) = setup().await;
    let p = product(&engine, "P", 10, 1000).await;

    let sale = pending_sale(&p.id, 2, 1000);
    db.sales().insert_sale(&sale).await.unwrap();
    engine
        .ledger
        .apply_delta(
            OWNER,
            &p.id,
            -2,
            &line_options(&sale, 1),
        )
        .await
        .unwrap();

    let report = engine.reconciler.reconcile_before(soon()).await.unwrap();
    assert_eq!(report.completed, vec![sale.id.clone()]);

    let settled = engine.sales.get_sale(OWNER, &sale.id).await.unwrap();
    assert_eq!(settled.status, SaleStatus::Completed);
    assert_eq!(stock_of(&engine, &p.id).await, 8);

    let movements = engine
        .movements
        .movements_for_reference(OWNER, "sales", &sale.id)
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].kind, MovementKind::Income);
    assert_eq!(movements[0].amount_cents, 2000);
}

#[tokio::test]
async fn test_interrupted_cancellation_is_finished() {
    let (db, engine) = setup().await;
    let p = product(&engine, "P", 10, 1000).await;

    let sale = engine
        .sales
        .create_sale(OWNER, NewSale::new(vec![NewSaleItem::new(&p.id, 4, 1000)]))
        .await
        .unwrap();
    assert_eq!(stock_of(&engine, &p.id).await, 6);

    let moved = db
        .sales()
        .transition_sale(&SaleTransition {
            sale_id: sale.id.clone(),
            from: SaleStatus::Completed,
            to: SaleStatus::Cancelling,
            at: Utc::now(),
            movement: None,
        })
        .await
        .unwrap();
    assert!(moved);

    let report = engine.reconciler.reconcile_before(soon()).await.unwrap();
    assert_eq!(report.cancelled, vec![sale.id.clone()]);

    let settled = engine.sales.get_sale(OWNER, &sale.id).await.unwrap();
    assert_eq!(settled.status, SaleStatus::Cancelled);
    assert_eq!(stock_of(&engine, &p.id).await, 10);

    let movements = engine
        .movements
        .movements_for_reference(OWNER, "sales", &sale.id)
        .await
        .unwrap();
    assert_eq!(movements.len(), 2);
    assert!(movements.iter().any(|m| m.kind == MovementKind::Expense));
}

#[tokio::test]
async fn test_cancel_resumes_interrupted_cancellation() {
    let (db, engine) = setup().await;
    let p = product(&engine, "P", 10, 1000).await;

    let sale = engine
        .sales
        .create_sale(OWNER, NewSale::new(vec![NewSaleItem::new(&p.id, 4, 1000)]))
        .await
        .unwrap();
    db.sales()
        .transition_sale(&SaleTransition {
            sale_id: sale.id.clone(),
            from: SaleStatus::Completed,
            to: SaleStatus::Cancelling,
            at: Utc::now(),
            movement: None,
        })
        .await
        .unwrap();

    let cancelled = engine.sales.cancel_sale(OWNER, &sale.id).await.unwrap();
    assert_eq!(cancelled.status, SaleStatus::Cancelled);
    assert_eq!(stock_of(&engine, &p.id).await, 10);
}

#[tokio::test]
async fn test_recent_sales_are_left_alone() {
    let (db, engine) = setup().await;
    let p = product(&engine, "P", 10, 1000).await;

    let sale = pending_sale(&p.id, 1, 1000);
    db.sales().insert_sale(&sale).await.unwrap();

    let report = engine
        .reconciler
        .reconcile_stale_sales(Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(report.examined, 0);

    let pending = engine
        .sales
        .list_sales(
            OWNER,
            &SaleFilter {
                status: Some(SaleStatus::Pending),
                ..SaleFilter::default()
            },
            Default::default(),
        )
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_pending_sale_without_decrements_is_abandoned() {
    let (db, engine) = setup().await;
    let p = product(&engine, "P", 10, 1000).await;

    let sale = pending_sale(&p.id, 3, 1000);
    db.sales().insert_sale(&sale).await.unwrap();

    let report = engine.reconciler.reconcile_before(soon()).await.unwrap();
    assert_eq!(report.cancelled, vec![sale.id.clone()]);
    assert_eq!(stock_of(&engine, &p.id).await, 10);

    let settled = engine.sales.get_sale(OWNER, &sale.id).await.unwrap();
    assert_eq!(settled.status, SaleStatus::Cancelled);
}

#[tokio::test]
async fn test_completion_during_rollback_claim_keeps_stock() {
    let (db, engine, gate) = setup_with_gate().await;
    let p = product(&engine, "P", 10, 1000).await;

    let sale = pending_sale_of(&[(&p.id, 2, 1000), (&p.id, 1, 1000)]);
    db.sales().insert_sale(&sale).await.unwrap();
    engine
        .ledger
        .apply_delta(OWNER, &p.id, -2, &line_options(&sale, 1))
        .await
        .unwrap();

    gate.arm();
    let reconciler = engine.reconciler.clone();
    let pass = tokio::spawn(async move { reconciler.reconcile_before(soon()).await });

    // The creator finishes its last line and completes while the claim is held.
    gate.reached().await;
    engine
        .ledger
        .apply_delta(OWNER, &p.id, -1, &line_options(&sale, 2))
        .await
        .unwrap();
    let completed = db
        .sales()
        .transition_sale(&SaleTransition {
            sale_id: sale.id.clone(),
            from: SaleStatus::Pending,
            to: SaleStatus::Completed,
            at: Utc::now(),
            movement: None,
        })
        .await
        .unwrap();
    assert!(completed);
    gate.release();

    let report = pass.await.unwrap().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.skipped, vec![sale.id.clone()]);
    assert!(report.cancelled.is_empty());

    let settled = engine.sales.get_sale(OWNER, &sale.id).await.unwrap();
    assert_eq!(settled.status, SaleStatus::Completed);
    assert_eq!(stock_of(&engine, &p.id).await, 7);
}

#[tokio::test]
async fn test_interrupted_reversal_is_finished() {
    let (db, engine) = setup().await;
    let p = product(&engine, "P", 10, 1000).await;

    let sale = pending_sale(&p.id, 3, 1000);
    db.sales().insert_sale(&sale).await.unwrap();
    engine
        .ledger
        .apply_delta(OWNER, &p.id, -3, &line_options(&sale, 1))
        .await
        .unwrap();
    db.sales()
        .transition_sale(&SaleTransition {
            sale_id: sale.id.clone(),
            from: SaleStatus::Pending,
            to: SaleStatus::Reverting,
            at: Utc::now(),
            movement: None,
        })
        .await
        .unwrap();
    assert_eq!(stock_of(&engine, &p.id).await, 7);

    let report = engine.reconciler.reconcile_before(soon()).await.unwrap();
    assert_eq!(report.cancelled, vec![sale.id.clone()]);
    assert_eq!(stock_of(&engine, &p.id).await, 10);

    let settled = engine.sales.get_sale(OWNER, &sale.id).await.unwrap();
    assert_eq!(settled.status, SaleStatus::Cancelled);

    let movements = engine
        .movements
        .movements_for_reference(OWNER, "sales", &sale.id)
        .await
        .unwrap();
    assert!(movements.is_empty());
}
