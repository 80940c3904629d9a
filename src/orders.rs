//! Orders
//!
//! 注文の読み取り、ステータス遷移、明細修正、見積もり。
//! 新規作成は `commit` モジュール。

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::composer::OrderDraft;
use crate::db::DbPool;
use crate::error::AppError;
use crate::inventory::{self, Adjustment};
use crate::models::{
    CommitStatus, CorrectOrderItemRequest, Order, OrderItem, OrderResponse, OrderStatus,
    PaymentDetailRow, PaymentDetails, QuoteLine, QuoteRequest, QuoteResponse,
};
use crate::money::{from_cents, to_cents};
use crate::now_ms;
use crate::pricing;

pub async fn find_order(db: &DbPool, order_id: &str) -> Result<Order, AppError> {
    sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(order_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {}", order_id)))
}

pub async fn order_items(db: &DbPool, order_id: &str) -> Result<Vec<OrderItem>, AppError> {
    Ok(sqlx::query_as("SELECT * FROM order_items WHERE order_id = ? ORDER BY line_no")
        .bind(order_id)
        .fetch_all(db)
        .await?)
}

async fn payment_detail(db: &DbPool, order_id: &str) -> Result<Option<PaymentDetails>, AppError> {
    let row: Option<PaymentDetailRow> =
        sqlx::query_as("SELECT * FROM payment_details WHERE order_id = ?")
            .bind(order_id)
            .fetch_optional(db)
            .await?;
    row.map(PaymentDetails::try_from).transpose()
}

/// ヘッダ + 明細 + 支払い詳細
pub async fn to_response(db: &DbPool, order: &Order) -> Result<OrderResponse, AppError> {
    let items = order_items(db, &order.id).await?;
    let payment = payment_detail(db, &order.id).await?;
    OrderResponse::from_parts(order, &items, payment)
}

pub async fn load_order(db: &DbPool, order_id: &str) -> Result<OrderResponse, AppError> {
    let order = find_order(db, order_id).await?;
    to_response(db, &order).await
}

pub async fn list_orders(
    db: &DbPool,
    status: Option<OrderStatus>,
    customer_id: Option<&str>,
) -> Result<Vec<OrderResponse>, AppError> {
    let status = status.map(|s| s.as_str());
    let orders: Vec<Order> = sqlx::query_as(
        "SELECT * FROM orders WHERE (? IS NULL OR status = ?) AND (? IS NULL OR customer_id = ?) ORDER BY created_at DESC, order_number DESC"
    )
    .bind(status)
    .bind(status)
    .bind(customer_id)
    .bind(customer_id)
    .fetch_all(db)
    .await?;

    let mut responses = Vec::with_capacity(orders.len());
    for order in &orders {
        responses.push(to_response(db, order).await?);
    }
    Ok(responses)
}

fn require_completed(order: &Order) -> Result<(), AppError> {
    match order.commit_status()? {
        CommitStatus::Completed => Ok(()),
        other => Err(AppError::Conflict(format!(
            "order {} is not fully committed (commit status {})",
            order.order_number, other
        ))),
    }
}

/// ステータス遷移。現在値を条件にした UPDATE で同時変更を検出する。
/// 在庫の戻しも同じトランザクションで行う
pub async fn change_status(
    db: &DbPool,
    order_id: &str,
    next: OrderStatus,
) -> Result<Order, AppError> {
    let order = find_order(db, order_id).await?;
    require_completed(&order)?;

    let current = order.status()?;
    if !current.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "cannot change order status from {} to {}",
            current, next
        )));
    }

    let item_ids: Vec<(String,)> = if current.restocks_on(next) {
        sqlx::query_as("SELECT id FROM order_items WHERE order_id = ? ORDER BY line_no")
            .bind(order_id)
            .fetch_all(db)
            .await?
    } else {
        Vec::new()
    };

    let mut tx = db.begin().await?;

    let updated = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(next.as_str())
        .bind(now_ms())
        .bind(order_id)
        .bind(current.as_str())
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::Conflict(format!(
            "order {} status changed concurrently",
            order.order_number
        )));
    }

    for (item_id,) in &item_ids {
        inventory::release_order_item(&mut tx, item_id).await?;
    }
    tx.commit().await?;

    info!("Order status changed: order_id={}, {} -> {}", order_id, current, next);
    find_order(db, order_id).await
}

/// 未処理（pending）注文の明細修正。在庫は差分だけ動かし、合計を再計算する
pub async fn correct_item(
    db: &DbPool,
    order_id: &str,
    item_id: &str,
    req: &CorrectOrderItemRequest,
) -> Result<Order, AppError> {
    let order = find_order(db, order_id).await?;
    require_completed(&order)?;
    if order.status()? != OrderStatus::Pending {
        return Err(AppError::Conflict(format!(
            "only pending orders can be corrected; order {} is {}",
            order.order_number, order.status
        )));
    }

    let item: OrderItem = sqlx::query_as("SELECT * FROM order_items WHERE id = ? AND order_id = ?")
        .bind(item_id)
        .bind(order_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order item {}", item_id)))?;

    let quantity = req.quantity.unwrap_or(item.quantity);
    if quantity < 1 {
        return Err(AppError::Validation("quantity must be at least 1".to_string()));
    }
    let unit_price_cents = match req.unit_price {
        Some(price) if price < Decimal::ZERO => {
            return Err(AppError::Validation("unit price must not be negative".to_string()))
        }
        Some(price) => to_cents(price)?,
        None => item.unit_price_cents,
    };

    let total_cents = quantity
        .checked_mul(unit_price_cents)
        .ok_or_else(|| AppError::Validation("item total is out of range".to_string()))?;

    let mut tx = db.begin().await?;

    match inventory::adjust_order_item(&mut tx, &item, quantity, unit_price_cents, total_cents).await? {
        Adjustment::Applied => {}
        Adjustment::Insufficient { available } => {
            return Err(AppError::Conflict(format!(
                "insufficient inventory for platform {}: need {} more, available {}",
                item.platform_id,
                quantity - item.quantity,
                available
            )));
        }
        Adjustment::Stale => {
            return Err(AppError::Conflict(format!(
                "order item {} changed concurrently; reload and retry",
                item_id
            )));
        }
    }

    // SET 式はすべて更新前の値を参照する
    sqlx::query(r#"
        UPDATE orders SET
            subtotal_cents = (SELECT COALESCE(SUM(total_price_cents), 0) FROM order_items WHERE order_id = ?1),
            discount_cents = MIN(discount_cents, (SELECT COALESCE(SUM(total_price_cents), 0) FROM order_items WHERE order_id = ?1)),
            total_amount_cents = (SELECT COALESCE(SUM(total_price_cents), 0) FROM order_items WHERE order_id = ?1)
                - MIN(discount_cents, (SELECT COALESCE(SUM(total_price_cents), 0) FROM order_items WHERE order_id = ?1)),
            updated_at = ?2
        WHERE id = ?1
    "#)
    .bind(order_id)
    .bind(now_ms())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Order item corrected: order_id={}, item={}, qty {} -> {}, unit_price_cents {} -> {}",
        order_id, item_id, item.quantity, quantity, item.unit_price_cents, unit_price_cents
    );

    find_order(db, order_id).await
}

/// 書き込みなしの見積もり
pub async fn quote(db: &DbPool, req: &QuoteRequest) -> Result<QuoteResponse, AppError> {
    let customer_id = req.customer_id.as_deref().filter(|c| !c.trim().is_empty());

    let mut draft = OrderDraft::new();
    for (n, item) in req.items.iter().enumerate() {
        let n = n + 1;
        if item.quantity < 1 {
            return Err(AppError::Validation(format!("item {}: quantity must be at least 1", n)));
        }
        if item.unit_price.map_or(false, |p| p < Decimal::ZERO) {
            return Err(AppError::Validation(format!("item {}: unit price must not be negative", n)));
        }
        let platform = inventory::get(db, &item.platform_id)
            .await?
            .ok_or_else(|| AppError::Validation(format!("item {}: platform not found: {}", n, item.platform_id)))?;

        let (unit_price, source) =
            pricing::price_item(db, customer_id, &platform, item.quantity, item.unit_price).await?;
        let unit_price = from_cents(to_cents(unit_price)?);
        draft
            .add_item(platform.id, item.quantity, unit_price, source)
            .map_err(|e| AppError::Validation(format!("item {}: {}", n, e)))?;
    }
    draft
        .set_discount(req.discount_amount)
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let totals = draft
        .compute_totals()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let platform_ids: Vec<&str> = draft.quantity_by_platform().into_keys().collect();
    let levels = inventory::snapshot(db, &platform_ids).await?;
    let shortfalls = draft.inventory_shortfalls(&levels);
    if !shortfalls.is_empty() {
        warn!("Quote exceeds inventory: {:?}", shortfalls);
    }

    let lines = draft
        .lines()
        .iter()
        .map(|l| -> Result<QuoteLine, AppError> {
            Ok(QuoteLine {
                line_id: l.line_id,
                platform_id: l.platform_id.clone(),
                quantity: l.quantity,
                unit_price: l.unit_price,
                total_price: l.total()?,
                price_source: l.price_source,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(QuoteResponse {
        success: true,
        lines,
        totals,
        shortfalls,
    })
}
