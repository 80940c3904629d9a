mod common;

use rust_decimal_macros::dec;

use common::*;
use reseller_admin::commit::{abandon_commit, commit_order, resume_commit, CommitError};
use reseller_admin::models::{CommitStatus, OrderStatus, PaymentDetails};
use reseller_admin::orders::{load_order, order_items};

#[tokio::test]
async fn gold_coins_order_commits_end_to_end() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold Coins", 100, 300).await;
    seed_tier(db, &acme, &gold, 1, Some(10), 250).await;

    let order = commit_order(db, &app.state.order_numbers, order_request(&acme, vec![item(&gold, 4)], dec!(1)))
        .await
        .unwrap();

    assert!(order.order_number.starts_with("ORD-"));
    assert_eq!(order.status().unwrap(), OrderStatus::Pending);
    assert_eq!(order.commit_status().unwrap(), CommitStatus::Completed);
    assert_eq!(order.subtotal_cents, 1000);
    assert_eq!(order.discount_cents, 100);
    assert_eq!(order.total_amount_cents, 900);
    assert_eq!(inventory_of(db, &gold).await, 96);

    let detail = load_order(db, &order.id).await.unwrap();
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].unit_price, dec!(2.50));
    assert!(detail.items[0].inventory_applied);
    assert!(matches!(detail.payment, Some(PaymentDetails::Cash { .. })));
}

#[tokio::test]
async fn validation_failures_persist_nothing() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold Coins", 3, 300).await;
    let numbers = &app.state.order_numbers;

    let empty = commit_order(db, numbers, order_request(&acme, vec![], dec!(0))).await;
    assert!(matches!(empty, Err(CommitError::Validation(_))));

    let zero_qty = commit_order(db, numbers, order_request(&acme, vec![item(&gold, 0)], dec!(0))).await;
    assert!(matches!(zero_qty, Err(CommitError::Validation(_))));

    let negative_discount = commit_order(db, numbers, order_request(&acme, vec![item(&gold, 1)], dec!(-1))).await;
    assert!(matches!(negative_discount, Err(CommitError::Validation(_))));

    let mut no_customer = order_request(&acme, vec![item(&gold, 1)], dec!(0));
    no_customer.customer_id = None;
    assert!(matches!(commit_order(db, numbers, no_customer).await, Err(CommitError::Validation(_))));

    // 2 行合計で在庫超過
    let too_many = commit_order(db, numbers, order_request(&acme, vec![item(&gold, 2), item(&gold, 2)], dec!(0))).await;
    match too_many {
        Err(e @ CommitError::InsufficientInventory { .. }) => {
            assert_eq!(e.code(), "insufficient_inventory");
            assert_eq!(e.order_id(), None);
        }
        other => panic!("unexpected {:?}", other.map(|o| o.id)),
    }

    let (orders,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders").fetch_one(db).await.unwrap();
    assert_eq!(orders, 0);
    assert_eq!(inventory_of(db, &gold).await, 3);
}

#[tokio::test]
async fn payment_failure_is_distinct_and_resumable() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold Coins", 100, 300).await;
    let numbers = &app.state.order_numbers;

    fail_inserts_into(db, "orders").await;
    let header_err = commit_order(db, numbers, order_request(&acme, vec![item(&gold, 4)], dec!(0)))
        .await
        .unwrap_err();
    restore_inserts_into(db, "orders").await;
    assert_eq!(header_err.code(), "header_insert_failed");
    assert_eq!(header_err.order_id(), None);

    fail_inserts_into(db, "payment_details").await;
    let payment_err = commit_order(db, numbers, order_request(&acme, vec![item(&gold, 4)], dec!(0)))
        .await
        .unwrap_err();
    assert_eq!(payment_err.code(), "payment_insert_failed");
    assert_ne!(payment_err.code(), header_err.code());

    let order_id = payment_err.order_id().unwrap().to_string();
    let partial = load_order(db, &order_id).await.unwrap();
    assert_eq!(partial.commit_status, CommitStatus::ItemsSaved);
    assert!(partial.commit_error.is_some());
    assert_eq!(partial.items.len(), 1);
    assert!(partial.payment.is_none());
    assert_eq!(inventory_of(db, &gold).await, 100);

    restore_inserts_into(db, "payment_details").await;
    let resumed = resume_commit(db, &order_id).await.unwrap();
    assert_eq!(resumed.commit_status().unwrap(), CommitStatus::Completed);
    assert_eq!(inventory_of(db, &gold).await, 96);

    // 完了済みの再開は何もしない
    resume_commit(db, &order_id).await.unwrap();
    assert_eq!(inventory_of(db, &gold).await, 96);
}

#[tokio::test]
async fn items_failure_leaves_header_only() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold Coins", 10, 300).await;

    fail_inserts_into(db, "order_items").await;
    let err = commit_order(db, &app.state.order_numbers, order_request(&acme, vec![item(&gold, 1)], dec!(0)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "items_insert_failed");

    let order_id = err.order_id().unwrap();
    let partial = load_order(db, order_id).await.unwrap();
    assert_eq!(partial.commit_status, CommitStatus::HeaderSaved);
    assert!(partial.items.is_empty());
}

#[tokio::test]
async fn inventory_failure_then_abandon_restores_applied_stock() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold", 20, 300).await;
    let silver = seed_platform(db, "Silver", 20, 100).await;

    sqlx::query(
        "CREATE TRIGGER fail_silver BEFORE UPDATE OF inventory ON platforms WHEN OLD.platform = 'Silver' BEGIN SELECT RAISE(ABORT, 'simulated outage'); END;"
    )
    .execute(db)
    .await
    .unwrap();

    let err = commit_order(
        db,
        &app.state.order_numbers,
        order_request(&acme, vec![item(&gold, 5), item(&silver, 5)], dec!(0)),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "inventory_update_failed");
    assert_eq!(inventory_of(db, &gold).await, 15);
    assert_eq!(inventory_of(db, &silver).await, 20);

    let order_id = err.order_id().unwrap().to_string();
    let abandoned = abandon_commit(db, &order_id).await.unwrap();
    assert_eq!(abandoned.status().unwrap(), OrderStatus::Cancelled);
    assert_eq!(abandoned.commit_status().unwrap(), CommitStatus::RolledBack);
    assert_eq!(inventory_of(db, &gold).await, 20);
    assert_eq!(inventory_of(db, &silver).await, 20);

    // 取り消し済みは再開できない。記録は残る
    assert!(matches!(resume_commit(db, &order_id).await, Err(CommitError::NotResumable { .. })));
    assert_eq!(order_items(db, &order_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn shortage_at_inventory_step_compensates() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold", 20, 300).await;
    let silver = seed_platform(db, "Silver", 20, 100).await;

    fail_inserts_into(db, "payment_details").await;
    let err = commit_order(
        db,
        &app.state.order_numbers,
        order_request(&acme, vec![item(&gold, 5), item(&silver, 5)], dec!(0)),
    )
    .await
    .unwrap_err();
    let order_id = err.order_id().unwrap().to_string();
    restore_inserts_into(db, "payment_details").await;

    // 中断中に silver が売れた
    sqlx::query("UPDATE platforms SET inventory = 2 WHERE id = ?")
        .bind(&silver)
        .execute(db)
        .await
        .unwrap();

    match resume_commit(db, &order_id).await {
        Err(CommitError::InsufficientInventory { order_id: Some(id), requested, available, .. }) => {
            assert_eq!(id, order_id);
            assert_eq!((requested, available), (5, 2));
        }
        other => panic!("unexpected {:?}", other.map(|o| o.id)),
    }

    let order = load_order(db, &order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.commit_status, CommitStatus::RolledBack);
    assert!(order.items.iter().all(|i| !i.inventory_applied));
    assert_eq!(inventory_of(db, &gold).await, 20);
    assert_eq!(inventory_of(db, &silver).await, 2);
}

#[tokio::test]
async fn concurrent_commits_never_oversell() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold", 8, 300).await;
    let numbers = &app.state.order_numbers;

    let (a, b) = tokio::join!(
        commit_order(db, numbers, order_request(&acme, vec![item(&gold, 5)], dec!(0))),
        commit_order(db, numbers, order_request(&acme, vec![item(&gold, 5)], dec!(0))),
    );

    let results = [a, b];
    let completed = results.iter().filter(|r| r.is_ok()).count();
    let short = results
        .iter()
        .filter(|r| matches!(r, Err(CommitError::InsufficientInventory { .. })))
        .count();
    assert_eq!((completed, short), (1, 1));
    assert_eq!(inventory_of(db, &gold).await, 3);

    let (done,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE commit_status = 'completed'")
        .fetch_one(db)
        .await
        .unwrap();
    assert_eq!(done, 1);
}

#[tokio::test]
async fn idempotency_key_returns_existing_order() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold", 10, 300).await;

    let mut req = order_request(&acme, vec![item(&gold, 2)], dec!(0));
    req.idempotency_key = Some("checkout-42".to_string());

    let first = commit_order(db, &app.state.order_numbers, req.clone()).await.unwrap();
    let second = commit_order(db, &app.state.order_numbers, req).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(inventory_of(db, &gold).await, 8);
}

#[tokio::test]
async fn explicit_and_fallback_prices() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold", 50, 300).await;
    seed_tier(db, &acme, &gold, 1, Some(10), 250).await;

    let mut manual = item(&gold, 2);
    manual.unit_price = Some(dec!(1.75));
    let order = commit_order(
        db,
        &app.state.order_numbers,
        order_request(&acme, vec![manual, item(&gold, 20)], dec!(0)),
    )
    .await
    .unwrap();

    let items = order_items(db, &order.id).await.unwrap();
    assert_eq!(items[0].unit_price_cents, 175);
    // 20 個はティア範囲外 → 原価
    assert_eq!(items[1].unit_price_cents, 300);
    assert_eq!(order.subtotal_cents, 2 * 175 + 20 * 300);
}

#[tokio::test]
async fn header_totals_match_stored_items() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold", 50, 300).await;

    let mut fractional = item(&gold, 3);
    fractional.unit_price = Some(dec!(0.005));
    let order = commit_order(db, &app.state.order_numbers, order_request(&acme, vec![fractional], dec!(0)))
        .await
        .unwrap();

    let items = order_items(db, &order.id).await.unwrap();
    assert_eq!(items[0].unit_price_cents, 1);
    assert_eq!(order.subtotal_cents, items.iter().map(|i| i.total_price_cents).sum::<i64>());
    assert_eq!(order.total_amount_cents, 3);
}

#[tokio::test]
async fn racing_resumes_leave_completed_order_clean() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold", 100, 300).await;

    fail_inserts_into(db, "payment_details").await;
    let err = commit_order(db, &app.state.order_numbers, order_request(&acme, vec![item(&gold, 4)], dec!(0)))
        .await
        .unwrap_err();
    restore_inserts_into(db, "payment_details").await;
    let order_id = err.order_id().unwrap().to_string();

    let (a, b) = tokio::join!(resume_commit(db, &order_id), resume_commit(db, &order_id));
    assert!(a.is_ok() || b.is_ok());

    let order = load_order(db, &order_id).await.unwrap();
    assert_eq!(order.commit_status, CommitStatus::Completed);
    assert!(order.commit_error.is_none());
    assert_eq!(inventory_of(db, &gold).await, 96);
}
