//! Inventory Ledger
//!
//! platforms.inventory の唯一の書き込み口。減算は
//! `UPDATE ... WHERE inventory >= ? RETURNING` の 1 文で行うので
//! 同時コミットでも負の在庫や更新の取りこぼしは起きない。

use std::collections::HashMap;

use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::{OrderItem, Platform, PurchaseRecord, PurchaseRequest};
use crate::money::to_cents;
use crate::now_ms;

/// 減算結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    Applied { remaining: i64 },
    Insufficient { available: i64 },
    /// 明細はすでに在庫に反映済み
    AlreadyApplied,
}

/// 有効な（削除されていない）プラットフォーム
pub async fn get(db: &DbPool, platform_id: &str) -> Result<Option<Platform>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM platforms WHERE id = ? AND deleted_at IS NULL")
        .bind(platform_id)
        .fetch_optional(db)
        .await
}

/// 在庫スナップショット（有効なもののみ）
pub async fn snapshot(db: &DbPool, platform_ids: &[&str]) -> Result<HashMap<String, i64>, sqlx::Error> {
    let mut levels = HashMap::new();
    for id in platform_ids {
        if let Some(p) = get(db, id).await? {
            levels.insert(p.id, p.inventory);
        }
    }
    Ok(levels)
}

pub async fn low_stock(db: &DbPool) -> Result<Vec<Platform>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM platforms WHERE deleted_at IS NULL AND inventory <= low_stock_alert ORDER BY inventory ASC, platform ASC"
    )
    .fetch_all(db)
    .await
}

async fn available(conn: &mut SqliteConnection, platform_id: &str) -> Result<i64, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT inventory FROM platforms WHERE id = ? AND deleted_at IS NULL")
            .bind(platform_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.map(|(n,)| n).unwrap_or(0))
}

/// 在庫が足りるときだけ減らす。足りなければ None
async fn take(
    conn: &mut SqliteConnection,
    platform_id: &str,
    amount: i64,
) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as(
        "UPDATE platforms SET inventory = inventory - ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL AND inventory >= ? RETURNING inventory"
    )
    .bind(amount)
    .bind(now_ms())
    .bind(platform_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|(n,)| n))
}

/// 在庫を戻す（削除済みでも戻す）
async fn put_back(
    conn: &mut SqliteConnection,
    platform_id: &str,
    amount: i64,
) -> Result<i64, sqlx::Error> {
    let (remaining,): (i64,) = sqlx::query_as(
        "UPDATE platforms SET inventory = inventory + ?, updated_at = ? WHERE id = ? RETURNING inventory"
    )
    .bind(amount)
    .bind(now_ms())
    .bind(platform_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(remaining)
}

/// 単体の減算
pub async fn decrement(db: &DbPool, platform_id: &str, amount: i64) -> Result<Decrement, sqlx::Error> {
    let mut conn = db.acquire().await?;
    match take(&mut conn, platform_id, amount).await? {
        Some(remaining) => Ok(Decrement::Applied { remaining }),
        None => Ok(Decrement::Insufficient {
            available: available(&mut conn, platform_id).await?,
        }),
    }
}

/// 在庫を戻す（履歴なし）
pub async fn restock(db: &DbPool, platform_id: &str, amount: i64) -> Result<i64, sqlx::Error> {
    let mut conn = db.acquire().await?;
    put_back(&mut conn, platform_id, amount).await
}

/// 仕入れ: 在庫加算と履歴追加を同一トランザクションで
pub async fn increment(
    db: &DbPool,
    platform_id: &str,
    purchase: &PurchaseRequest,
) -> Result<PurchaseRecord, AppError> {
    if purchase.quantity < 1 {
        return Err(AppError::Validation("quantity must be at least 1".to_string()));
    }
    if purchase.cost_per_unit.is_sign_negative() && !purchase.cost_per_unit.is_zero() {
        return Err(AppError::Validation("cost_per_unit must not be negative".to_string()));
    }
    let cost_cents = to_cents(purchase.cost_per_unit)?;
    let now = now_ms();

    let mut tx = db.begin().await?;

    let new_inventory: Option<(i64,)> = sqlx::query_as(
        "UPDATE platforms SET inventory = inventory + ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL RETURNING inventory"
    )
    .bind(purchase.quantity)
    .bind(now)
    .bind(platform_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((new_inventory,)) = new_inventory else {
        tx.rollback().await?;
        return Err(AppError::NotFound(format!("Platform {}", platform_id)));
    };

    let record = PurchaseRecord {
        id: Uuid::new_v4().to_string(),
        platform_id: platform_id.to_string(),
        quantity: purchase.quantity,
        cost_per_unit_cents: cost_cents,
        supplier: purchase.supplier.clone(),
        previous_inventory: new_inventory - purchase.quantity,
        new_inventory,
        notes: purchase.notes.clone(),
        created_by: purchase.created_by.clone(),
        created_at: now,
    };

    sqlx::query(r#"
        INSERT INTO purchase_history (
            id, platform_id, quantity, cost_per_unit_cents, supplier,
            previous_inventory, new_inventory, notes, created_by, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&record.id)
    .bind(&record.platform_id)
    .bind(record.quantity)
    .bind(record.cost_per_unit_cents)
    .bind(&record.supplier)
    .bind(record.previous_inventory)
    .bind(record.new_inventory)
    .bind(&record.notes)
    .bind(&record.created_by)
    .bind(record.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Stock purchased: platform={}, qty={}, inventory {} -> {}",
        platform_id, record.quantity, record.previous_inventory, record.new_inventory
    );
    Ok(record)
}

pub async fn purchase_history(db: &DbPool, platform_id: &str) -> Result<Vec<PurchaseRecord>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM purchase_history WHERE platform_id = ? ORDER BY created_at DESC, id"
    )
    .bind(platform_id)
    .fetch_all(db)
    .await
}

/// 注文明細を在庫に反映する。減算と inventory_applied の更新は同一トランザクション
pub async fn apply_order_item(db: &DbPool, item: &OrderItem) -> Result<Decrement, sqlx::Error> {
    let mut tx = db.begin().await?;

    let claimed = sqlx::query(
        "UPDATE order_items SET inventory_applied = 1 WHERE id = ? AND inventory_applied = 0"
    )
    .bind(&item.id)
    .execute(&mut *tx)
    .await?;

    if claimed.rows_affected() == 0 {
        tx.commit().await?;
        return Ok(Decrement::AlreadyApplied);
    }

    match take(&mut tx, &item.platform_id, item.quantity).await? {
        Some(remaining) => {
            tx.commit().await?;
            Ok(Decrement::Applied { remaining })
        }
        None => {
            tx.rollback().await?;
            let mut conn = db.acquire().await?;
            let available = available(&mut conn, &item.platform_id).await?;
            warn!(
                "Insufficient inventory: platform={}, requested={}, available={}",
                item.platform_id, item.quantity, available
            );
            Ok(Decrement::Insufficient { available })
        }
    }
}

/// 反映済みの明細を在庫に戻す。未反映なら何もしない。
/// 戻す数量は明細の現在値を使う。呼び出し側のトランザクション内で動く
pub async fn release_order_item(conn: &mut SqliteConnection, item_id: &str) -> Result<bool, sqlx::Error> {
    let released: Option<(String, i64)> = sqlx::query_as(
        "UPDATE order_items SET inventory_applied = 0 WHERE id = ? AND inventory_applied = 1 RETURNING platform_id, quantity"
    )
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((platform_id, quantity)) = released else {
        return Ok(false);
    };

    let remaining = put_back(conn, &platform_id, quantity).await?;
    info!(
        "Restocked: platform={}, qty={}, inventory={}",
        platform_id, quantity, remaining
    );
    Ok(true)
}

/// 明細修正の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Applied,
    Insufficient { available: i64 },
    /// 読み取った後に明細か注文が変わっていた
    Stale,
}

/// 反映済み明細の数量・単価修正。`item` を読んだ時点の数量を条件に明細を更新し、
/// 差分だけ在庫を動かす。pending 以外の注文の明細は更新しない。
///
/// 呼び出し側のトランザクション内で動く。`Applied` 以外ならロールバックすること。
pub async fn adjust_order_item(
    conn: &mut SqliteConnection,
    item: &OrderItem,
    new_quantity: i64,
    new_unit_price_cents: i64,
    new_total_cents: i64,
) -> Result<Adjustment, sqlx::Error> {
    let updated = sqlx::query(r#"
        UPDATE order_items SET quantity = ?, unit_price_cents = ?, total_price_cents = ?
        WHERE id = ? AND quantity = ? AND inventory_applied = 1
          AND EXISTS (SELECT 1 FROM orders WHERE orders.id = order_items.order_id AND orders.status = 'pending')
    "#)
    .bind(new_quantity)
    .bind(new_unit_price_cents)
    .bind(new_total_cents)
    .bind(&item.id)
    .bind(item.quantity)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Ok(Adjustment::Stale);
    }

    let delta = new_quantity - item.quantity;
    if delta > 0 {
        if take(conn, &item.platform_id, delta).await?.is_none() {
            return Ok(Adjustment::Insufficient {
                available: available(conn, &item.platform_id).await?,
            });
        }
    } else if delta < 0 {
        put_back(conn, &item.platform_id, -delta).await?;
    }
    Ok(Adjustment::Applied)
}
