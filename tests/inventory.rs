mod common;

use rust_decimal_macros::dec;

use common::*;
use reseller_admin::commit::commit_order;
use reseller_admin::error::AppError;
use reseller_admin::inventory::{self, Decrement};
use reseller_admin::models::{CorrectOrderItemRequest, OrderStatus, PurchaseRequest};
use reseller_admin::orders::{change_status, correct_item, find_order, order_items};
use reseller_admin::pricing::{resolve_price, PriceResolution};

#[tokio::test]
async fn decrement_never_goes_negative() {
    let app = setup().await;
    let db = app.db();
    let gold = seed_platform(db, "Gold", 8, 300).await;

    assert_eq!(inventory::decrement(db, &gold, 5).await.unwrap(), Decrement::Applied { remaining: 3 });
    assert_eq!(inventory::decrement(db, &gold, 5).await.unwrap(), Decrement::Insufficient { available: 3 });
    assert_eq!(inventory::decrement(db, &gold, 3).await.unwrap(), Decrement::Applied { remaining: 0 });
    assert_eq!(inventory::restock(db, &gold, 4).await.unwrap(), 4);
}

#[tokio::test]
async fn deleted_platforms_are_invisible_to_the_ledger() {
    let app = setup().await;
    let db = app.db();
    let gold = seed_platform(db, "Gold", 8, 300).await;
    sqlx::query("UPDATE platforms SET deleted_at = 1 WHERE id = ?")
        .bind(&gold)
        .execute(db)
        .await
        .unwrap();

    assert!(inventory::get(db, &gold).await.unwrap().is_none());
    assert_eq!(inventory::decrement(db, &gold, 1).await.unwrap(), Decrement::Insufficient { available: 0 });
    assert_eq!(inventory_of(db, &gold).await, 8);
}

#[tokio::test]
async fn purchase_updates_inventory_and_history_together() {
    let app = setup().await;
    let db = app.db();
    let gold = seed_platform(db, "Gold", 2, 300).await;

    let purchase = PurchaseRequest {
        quantity: 10,
        cost_per_unit: dec!(2.40),
        supplier: Some("Mint".to_string()),
        notes: None,
        created_by: None,
    };
    let record = inventory::increment(db, &gold, &purchase).await.unwrap();
    assert_eq!((record.previous_inventory, record.new_inventory), (2, 12));
    assert_eq!(record.cost_per_unit_cents, 240);

    // 履歴の INSERT が失敗したら在庫も戻る
    fail_inserts_into(db, "purchase_history").await;
    assert!(matches!(inventory::increment(db, &gold, &purchase).await, Err(AppError::Database(_))));
    assert_eq!(inventory_of(db, &gold).await, 12);
    assert_eq!(inventory::purchase_history(db, &gold).await.unwrap().len(), 1);

    let bad = PurchaseRequest { quantity: 0, ..purchase };
    assert!(matches!(inventory::increment(db, &gold, &bad).await, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn low_stock_lists_only_active_platforms_at_or_below_alert() {
    let app = setup().await;
    let db = app.db();
    let low = seed_platform(db, "Low", 10, 100).await;
    seed_platform(db, "Plenty", 11, 100).await;
    let gone = seed_platform(db, "Gone", 0, 100).await;
    sqlx::query("UPDATE platforms SET deleted_at = 1 WHERE id = ?")
        .bind(&gone)
        .execute(db)
        .await
        .unwrap();

    let ids: Vec<String> = inventory::low_stock(db).await.unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![low]);
}

#[tokio::test]
async fn resolution_reads_current_tiers() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let other = seed_customer(db, "Other").await;
    let gold = seed_platform(db, "Gold", 10, 300).await;
    seed_tier(db, &other, &gold, 1, None, 100).await;

    assert_eq!(resolve_price(db, &acme, &gold, 5).await.unwrap(), PriceResolution::NoTier);

    let tier = seed_tier(db, &acme, &gold, 1, Some(10), 250).await;
    assert_eq!(
        resolve_price(db, &acme, &gold, 5).await.unwrap(),
        PriceResolution::Tier { tier_id: tier, unit_price: dec!(2.50) }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_corrections_keep_inventory_consistent() {
    // 複数接続で競合させるためファイル DB を使う
    let app = setup_with(|c| {
        c.database_url = format!("sqlite://{}", c.data_dir.join("shop.db").display());
    })
    .await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;

    for round in 0..10 {
        let gold = seed_platform(db, &format!("Gold {}", round), 1000, 300).await;
        let order = commit_order(db, &app.state.order_numbers, order_request(&acme, vec![item(&gold, 5)], dec!(0)))
            .await
            .unwrap();
        let item_id = order_items(db, &order.id).await.unwrap()[0].id.clone();

        let tasks: Vec<_> = [10, 6]
            .into_iter()
            .map(|quantity| {
                let db = db.clone();
                let order_id = order.id.clone();
                let item_id = item_id.clone();
                tokio::spawn(async move {
                    let req = CorrectOrderItemRequest { quantity: Some(quantity), unit_price: None };
                    correct_item(&db, &order_id, &item_id, &req).await
                })
            })
            .collect();

        let mut applied = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => applied += 1,
                Err(AppError::Conflict(_)) => {}
                Err(e) => panic!("round {}: unexpected error {}", round, e),
            }
        }
        assert!(applied >= 1, "round {}: no correction applied", round);

        let items = order_items(db, &order.id).await.unwrap();
        assert_eq!(
            inventory_of(db, &gold).await + items[0].quantity,
            1000,
            "round {}: ledger drifted",
            round
        );
        let order = find_order(db, &order.id).await.unwrap();
        assert_eq!(order.subtotal_cents, items[0].total_price_cents);
    }
}

#[tokio::test]
async fn stale_correction_is_rejected() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold", 100, 300).await;
    let order = commit_order(db, &app.state.order_numbers, order_request(&acme, vec![item(&gold, 5)], dec!(0)))
        .await
        .unwrap();
    let stale = order_items(db, &order.id).await.unwrap().remove(0);

    correct_item(db, &order.id, &stale.id, &CorrectOrderItemRequest { quantity: Some(8), unit_price: None })
        .await
        .unwrap();
    assert_eq!(inventory_of(db, &gold).await, 92);

    // 古い数量（5）を前提にした修正は適用されない
    let mut tx = db.begin().await.unwrap();
    let outcome = inventory::adjust_order_item(&mut tx, &stale, 6, 300, 1800).await.unwrap();
    assert_eq!(outcome, inventory::Adjustment::Stale);
    tx.rollback().await.unwrap();
    assert_eq!(inventory_of(db, &gold).await, 92);
    assert_eq!(order_items(db, &order.id).await.unwrap()[0].quantity, 8);
}

#[tokio::test]
async fn failed_restock_leaves_status_unchanged() {
    let app = setup().await;
    let db = app.db();
    let acme = seed_customer(db, "Acme").await;
    let gold = seed_platform(db, "Gold", 20, 300).await;
    let silver = seed_platform(db, "Silver", 20, 100).await;
    let order = commit_order(
        db,
        &app.state.order_numbers,
        order_request(&acme, vec![item(&gold, 5), item(&silver, 5)], dec!(0)),
    )
    .await
    .unwrap();

    sqlx::query(
        "CREATE TRIGGER fail_silver BEFORE UPDATE OF inventory ON platforms WHEN OLD.platform = 'Silver' BEGIN SELECT RAISE(ABORT, 'simulated outage'); END;"
    )
    .execute(db)
    .await
    .unwrap();

    let err = change_status(db, &order.id, OrderStatus::Cancelled).await.unwrap_err();
    assert!(matches!(err, AppError::Database(_)));
    assert_eq!(find_order(db, &order.id).await.unwrap().status().unwrap(), OrderStatus::Pending);
    assert_eq!(inventory_of(db, &gold).await, 15);
    assert!(order_items(db, &order.id).await.unwrap().iter().all(|i| i.inventory_applied));

    // 復旧後の再試行で戻る
    sqlx::query("DROP TRIGGER fail_silver").execute(db).await.unwrap();
    let cancelled = change_status(db, &order.id, OrderStatus::Cancelled).await.unwrap();
    assert_eq!(cancelled.status().unwrap(), OrderStatus::Cancelled);
    assert_eq!(inventory_of(db, &gold).await, 20);
    assert_eq!(inventory_of(db, &silver).await, 20);
}
