//! Order Commit Sequence
//!
//! 検証 → ヘッダ → 明細 → 支払い詳細 → 在庫 の順に書き込む。
//! 全体を 1 トランザクションにはせず、各段階の完了を
//! `orders.commit_status` に記録する。途中で失敗した注文は
//! `resume_commit` で続きから再開するか、`abandon_commit` で
//! 在庫を戻して取り消す。
//!
//! 在庫段階で不足が見つかった場合だけは自動で巻き戻し、
//! 注文を cancelled / rolled_back にする。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::composer::{ComposerError, OrderDraft};
use crate::db::DbPool;
use crate::inventory::{self, Decrement};
use crate::models::{
    CommitOrderRequest, CommitStatus, Order, OrderItem, OrderStatus, PaymentDetails,
};
use crate::money::{from_cents, to_cents, AmountOutOfRange};
use crate::now_ms;
use crate::pricing;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("{0}")]
    Validation(String),

    #[error("insufficient inventory for platform {platform_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        order_id: Option<String>,
        platform_id: String,
        requested: i64,
        available: i64,
    },

    #[error("failed to save order header: {source}")]
    HeaderInsert { source: sqlx::Error },

    #[error("order {order_id} was saved without its items: {source}")]
    ItemsInsert { order_id: String, source: sqlx::Error },

    #[error("order {order_id} was saved without its payment detail: {source}")]
    PaymentInsert { order_id: String, source: sqlx::Error },

    #[error("order {order_id}: inventory update failed: {source}")]
    InventoryUpdate { order_id: String, source: sqlx::Error },

    #[error("order {0} not found")]
    NotFound(String),

    #[error("order {order_id} cannot be resumed: {reason}")]
    NotResumable { order_id: String, reason: String },

    #[error("order {order_id} has an unreadable draft: {reason}")]
    CorruptDraft { order_id: String, reason: String },

    #[error("failed to encode order draft: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("DB error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CommitError {
    pub fn code(&self) -> &'static str {
        match self {
            CommitError::Validation(_) => "validation_failed",
            CommitError::InsufficientInventory { .. } => "insufficient_inventory",
            CommitError::HeaderInsert { .. } => "header_insert_failed",
            CommitError::ItemsInsert { .. } => "items_insert_failed",
            CommitError::PaymentInsert { .. } => "payment_insert_failed",
            CommitError::InventoryUpdate { .. } => "inventory_update_failed",
            CommitError::NotFound(_) => "order_not_found",
            CommitError::NotResumable { .. } => "not_resumable",
            CommitError::CorruptDraft { .. } => "corrupt_draft",
            CommitError::Encode(_) => "draft_encoding_failed",
            CommitError::Database(_) => "database_error",
        }
    }

    /// 失敗時点で保存済みの注文
    pub fn order_id(&self) -> Option<&str> {
        match self {
            CommitError::InsufficientInventory { order_id, .. } => order_id.as_deref(),
            CommitError::ItemsInsert { order_id, .. }
            | CommitError::PaymentInsert { order_id, .. }
            | CommitError::InventoryUpdate { order_id, .. }
            | CommitError::NotResumable { order_id, .. }
            | CommitError::CorruptDraft { order_id, .. } => Some(order_id),
            CommitError::NotFound(order_id) => Some(order_id),
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CommitError::Validation(_) => StatusCode::BAD_REQUEST,
            CommitError::InsufficientInventory { .. } | CommitError::NotResumable { .. } => {
                StatusCode::CONFLICT
            }
            CommitError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AmountOutOfRange> for CommitError {
    fn from(e: AmountOutOfRange) -> Self {
        CommitError::Validation(e.to_string())
    }
}

impl From<ComposerError> for CommitError {
    fn from(e: ComposerError) -> Self {
        CommitError::Validation(e.to_string())
    }
}

/// `ORD-<unix_ms>` 採番。同一プロセス内では単調増加
#[derive(Debug, Default)]
pub struct OrderNumbers {
    last_ms: AtomicI64,
}

impl OrderNumbers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, now_ms: i64) -> String {
        let previous = self
            .last_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now_ms.max(last + 1)))
            .unwrap_or(now_ms - 1);
        format!("ORD-{}", now_ms.max(previous + 1))
    }
}

/// draft_json に保存する内容（再開に必要なもの全部）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommitPlan {
    draft: OrderDraft,
    payment: PaymentDetails,
}

/// 新規コミット
pub async fn commit_order(
    db: &DbPool,
    numbers: &OrderNumbers,
    req: CommitOrderRequest,
) -> Result<Order, CommitError> {
    // 同じ冪等キーなら既存注文を返す（途中なら再開）
    if let Some(key) = req.idempotency_key.as_deref().filter(|k| !k.is_empty()) {
        let existing: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE idempotency_key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;
        if let Some(order) = existing {
            info!("Idempotent commit: key={}, order_id={}", key, order.id);
            return resume_commit(db, &order.id).await;
        }
    }

    // 1. 検証
    let (customer_id, plan) = validate(db, &req).await?;

    // 2. ヘッダ
    let order_id = insert_header(db, numbers, &req, &customer_id, &plan).await?;

    // 3〜5
    advance(db, &order_id, &plan, CommitStatus::HeaderSaved).await?;
    load_header(db, &order_id).await
}

/// 途中で止まった注文を続きから進める
pub async fn resume_commit(db: &DbPool, order_id: &str) -> Result<Order, CommitError> {
    let order = load_header(db, order_id).await?;
    let status = order
        .commit_status()
        .map_err(|e| CommitError::CorruptDraft { order_id: order_id.to_string(), reason: e.to_string() })?;

    match status {
        CommitStatus::Completed => return Ok(order),
        CommitStatus::RolledBack => {
            return Err(CommitError::NotResumable {
                order_id: order_id.to_string(),
                reason: "order was rolled back".to_string(),
            })
        }
        _ => {}
    }

    let plan: CommitPlan = serde_json::from_str(&order.draft_json).map_err(|e| {
        CommitError::CorruptDraft { order_id: order_id.to_string(), reason: e.to_string() }
    })?;

    info!("Resuming commit: order_id={}, from={}", order_id, status);
    advance(db, order_id, &plan, status).await?;
    load_header(db, order_id).await
}

/// 未完了の注文を取り消し、反映済みの在庫を戻す。記録は残す
pub async fn abandon_commit(db: &DbPool, order_id: &str) -> Result<Order, CommitError> {
    let order = load_header(db, order_id).await?;
    match order.commit_status().ok() {
        Some(CommitStatus::Completed) => {
            return Err(CommitError::NotResumable {
                order_id: order_id.to_string(),
                reason: "order is already completed; change its status instead".to_string(),
            })
        }
        Some(CommitStatus::RolledBack) => return Ok(order),
        _ => {}
    }

    roll_back(db, order_id, "abandoned by operator")
        .await
        .map_err(|source| CommitError::InventoryUpdate { order_id: order_id.to_string(), source })?;

    info!("Commit abandoned: order_id={}", order_id);
    load_header(db, order_id).await
}

async fn load_header(db: &DbPool, order_id: &str) -> Result<Order, CommitError> {
    sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(order_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| CommitError::NotFound(order_id.to_string()))
}

// ========================================
// 1. 検証
// ========================================

async fn validate(
    db: &DbPool,
    req: &CommitOrderRequest,
) -> Result<(String, CommitPlan), CommitError> {
    let customer_id = req
        .customer_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CommitError::Validation("customer is required".to_string()))?;

    let customer: Option<(String,)> = sqlx::query_as("SELECT id FROM customers WHERE id = ?")
        .bind(customer_id)
        .fetch_optional(db)
        .await?;
    if customer.is_none() {
        return Err(CommitError::Validation(format!("customer not found: {}", customer_id)));
    }

    if let Some(employee_id) = req.created_by.as_deref() {
        let employee: Option<(String,)> =
            sqlx::query_as("SELECT id FROM employees WHERE id = ? AND active = 1")
                .bind(employee_id)
                .fetch_optional(db)
                .await?;
        if employee.is_none() {
            return Err(CommitError::Validation(format!("unknown or inactive employee: {}", employee_id)));
        }
    }

    if req.items.is_empty() {
        return Err(CommitError::Validation("order must contain at least one item".to_string()));
    }

    let mut draft = OrderDraft::new();
    let mut snapshot = HashMap::new();
    for (n, item) in req.items.iter().enumerate() {
        let n = n + 1;
        if item.platform_id.trim().is_empty() {
            return Err(CommitError::Validation(format!("item {}: platform is required", n)));
        }
        if item.quantity < 1 {
            return Err(CommitError::Validation(format!("item {}: quantity must be at least 1", n)));
        }
        if item.unit_price.map_or(false, |p| p < Decimal::ZERO) {
            return Err(CommitError::Validation(format!("item {}: unit price must not be negative", n)));
        }

        let platform = inventory::get(db, &item.platform_id).await?.ok_or_else(|| {
            CommitError::Validation(format!("item {}: platform not found: {}", n, item.platform_id))
        })?;

        let (unit_price, source) =
            pricing::price_item(db, Some(customer_id), &platform, item.quantity, item.unit_price).await?;
        // 明細はセント単位で保存するのでヘッダもそれに揃える
        let unit_price = from_cents(to_cents(unit_price)?);
        draft
            .add_item(&platform.id, item.quantity, unit_price, source)
            .map_err(|e| CommitError::Validation(format!("item {}: {}", n, e)))?;
        snapshot.insert(platform.id.clone(), platform.inventory);
    }

    draft.set_discount(req.discount_amount)?;

    if let Some(short) = draft.inventory_shortfalls(&snapshot).into_iter().next() {
        return Err(CommitError::InsufficientInventory {
            order_id: None,
            platform_id: short.platform_id,
            requested: short.requested,
            available: short.available,
        });
    }

    req.payment.validate().map_err(CommitError::Validation)?;

    Ok((
        customer_id.to_string(),
        CommitPlan { draft, payment: req.payment.clone() },
    ))
}

// ========================================
// 2. ヘッダ
// ========================================

async fn insert_header(
    db: &DbPool,
    numbers: &OrderNumbers,
    req: &CommitOrderRequest,
    customer_id: &str,
    plan: &CommitPlan,
) -> Result<String, CommitError> {
    let totals = plan.draft.compute_totals()?;
    let draft_json = serde_json::to_string(plan)?;
    let now = now_ms();
    let order_id = Uuid::new_v4().to_string();
    let order_number = numbers.next(now);

    sqlx::query(r#"
        INSERT INTO orders (
            id, order_number, customer_id, payment_method, status,
            subtotal_cents, discount_cents, total_amount_cents,
            commit_status, draft_json, idempotency_key, created_by,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&order_id)
    .bind(&order_number)
    .bind(customer_id)
    .bind(plan.payment.method().as_str())
    .bind(OrderStatus::Pending.as_str())
    .bind(to_cents(totals.subtotal)?)
    .bind(to_cents(totals.discount)?)
    .bind(to_cents(totals.final_total)?)
    .bind(CommitStatus::HeaderSaved.as_str())
    .bind(&draft_json)
    .bind(req.idempotency_key.as_deref().filter(|k| !k.is_empty()))
    .bind(&req.created_by)
    .bind(now)
    .bind(now)
    .execute(db)
    .await
    .map_err(|source| CommitError::HeaderInsert { source })?;

    info!(
        "Order header saved: order_id={}, number={}, total={}",
        order_id, order_number, totals.final_total
    );
    Ok(order_id)
}

// ========================================
// 3〜5
// ========================================

async fn advance(
    db: &DbPool,
    order_id: &str,
    plan: &CommitPlan,
    from: CommitStatus,
) -> Result<(), CommitError> {
    let mut status = from;
    loop {
        let step = match status {
            CommitStatus::HeaderSaved => insert_items(db, order_id, plan)
                .await
                .map(|_| CommitStatus::ItemsSaved)
                .map_err(|source| CommitError::ItemsInsert { order_id: order_id.to_string(), source }),
            CommitStatus::ItemsSaved => insert_payment(db, order_id, &plan.payment)
                .await
                .map(|_| CommitStatus::PaymentSaved)
                .map_err(|source| CommitError::PaymentInsert { order_id: order_id.to_string(), source }),
            CommitStatus::PaymentSaved => apply_inventory(db, order_id).await.map(|_| CommitStatus::Completed),
            CommitStatus::Completed => return Ok(()),
            CommitStatus::RolledBack => {
                return Err(CommitError::NotResumable {
                    order_id: order_id.to_string(),
                    reason: "order was rolled back".to_string(),
                })
            }
        };

        match step {
            Ok(next) => status = next,
            Err(e) => {
                record_failure(db, order_id, &e).await;
                return Err(e);
            }
        }
    }
}

/// 失敗内容をヘッダに残す（ベストエフォート）。
/// 別の再開処理が先に完了させた注文には書かない
async fn record_failure(db: &DbPool, order_id: &str, error: &CommitError) {
    warn!("Order commit failed: order_id={}, {}", order_id, error);
    let recorded = sqlx::query(
        "UPDATE orders SET commit_error = ?, updated_at = ? WHERE id = ? AND commit_status NOT IN (?, ?)"
    )
    .bind(error.to_string())
    .bind(now_ms())
    .bind(order_id)
    .bind(CommitStatus::Completed.as_str())
    .bind(CommitStatus::RolledBack.as_str())
    .execute(db)
    .await;

    if let Err(e) = recorded {
        warn!("Failed to record commit error for {}: {}", order_id, e);
    }
}

/// 3. 明細。全行とステータス更新を 1 トランザクションで
async fn insert_items(db: &DbPool, order_id: &str, plan: &CommitPlan) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    for (line_no, line) in plan.draft.lines().iter().enumerate() {
        // 検証済みなので範囲外にはならない
        let unit_price_cents = to_cents(line.unit_price).unwrap_or(0);
        sqlx::query(r#"
            INSERT INTO order_items (
                id, order_id, platform_id, line_no, quantity,
                unit_price_cents, total_price_cents, inventory_applied
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0)
        "#)
        .bind(Uuid::new_v4().to_string())
        .bind(order_id)
        .bind(&line.platform_id)
        .bind(line_no as i64 + 1)
        .bind(line.quantity)
        .bind(unit_price_cents)
        .bind(line.quantity * unit_price_cents)
        .execute(&mut *tx)
        .await?;
    }

    mark(&mut tx, order_id, CommitStatus::ItemsSaved).await?;
    tx.commit().await?;

    info!("Order items saved: order_id={}, lines={}", order_id, plan.draft.lines().len());
    Ok(())
}

/// 4. 支払い詳細。方法ごとに書き込むカラムを変える
async fn insert_payment(db: &DbPool, order_id: &str, payment: &PaymentDetails) -> Result<(), sqlx::Error> {
    let now = now_ms();
    let mut tx = db.begin().await?;

    match payment {
        PaymentDetails::Cash { cash_received_by, cash_receipt_number, notes } => {
            sqlx::query(r#"
                INSERT INTO payment_details (
                    order_id, payment_method, cash_received_by, cash_receipt_number, notes, created_at
                ) VALUES (?, ?, ?, ?, ?, ?)
            "#)
            .bind(order_id)
            .bind(payment.method().as_str())
            .bind(cash_received_by)
            .bind(cash_receipt_number)
            .bind(notes)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        PaymentDetails::Crypto {
            crypto_currency,
            crypto_network,
            crypto_username,
            crypto_wallet_address,
            crypto_transaction_hash,
        } => {
            sqlx::query(r#"
                INSERT INTO payment_details (
                    order_id, payment_method, crypto_currency, crypto_network,
                    crypto_username, crypto_wallet_address, crypto_transaction_hash, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#)
            .bind(order_id)
            .bind(payment.method().as_str())
            .bind(crypto_currency.as_str())
            .bind(crypto_network.as_str())
            .bind(crypto_username)
            .bind(crypto_wallet_address)
            .bind(crypto_transaction_hash)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        PaymentDetails::BankTransfer {
            bank_transaction_reference,
            bank_sender_name,
            bank_sender_bank,
            bank_transaction_time,
            bank_amount_in_currency,
            bank_exchange_rate,
            currency,
        } => {
            sqlx::query(r#"
                INSERT INTO payment_details (
                    order_id, payment_method, bank_transaction_reference, bank_sender_name,
                    bank_sender_bank, bank_transaction_time, bank_amount_in_currency,
                    bank_exchange_rate, currency, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#)
            .bind(order_id)
            .bind(payment.method().as_str())
            .bind(bank_transaction_reference)
            .bind(bank_sender_name)
            .bind(bank_sender_bank)
            .bind(bank_transaction_time.map(|t| t.to_rfc3339()))
            .bind(bank_amount_in_currency.map(|a| a.to_string()))
            .bind(bank_exchange_rate.map(|r| r.to_string()))
            .bind(currency)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
    }

    mark(&mut tx, order_id, CommitStatus::PaymentSaved).await?;
    tx.commit().await?;

    info!("Payment detail saved: order_id={}, method={}", order_id, payment.method());
    Ok(())
}

/// 5. 在庫。不足があればこの注文で反映済みの分を戻して取り消す
async fn apply_inventory(db: &DbPool, order_id: &str) -> Result<(), CommitError> {
    let to_update_err =
        |source: sqlx::Error| CommitError::InventoryUpdate { order_id: order_id.to_string(), source };

    let items = load_items(db, order_id).await.map_err(to_update_err)?;

    for item in &items {
        match inventory::apply_order_item(db, item).await.map_err(to_update_err)? {
            Decrement::Applied { remaining } => {
                info!(
                    "Inventory decremented: order_id={}, platform={}, qty={}, remaining={}",
                    order_id, item.platform_id, item.quantity, remaining
                );
            }
            Decrement::AlreadyApplied => {}
            Decrement::Insufficient { available } => {
                let reason = format!(
                    "insufficient inventory for platform {}: requested {}, available {}",
                    item.platform_id, item.quantity, available
                );
                roll_back(db, order_id, &reason).await.map_err(to_update_err)?;
                return Err(CommitError::InsufficientInventory {
                    order_id: Some(order_id.to_string()),
                    platform_id: item.platform_id.clone(),
                    requested: item.quantity,
                    available,
                });
            }
        }
    }

    sqlx::query("UPDATE orders SET commit_status = ?, commit_error = NULL, updated_at = ? WHERE id = ?")
        .bind(CommitStatus::Completed.as_str())
        .bind(now_ms())
        .bind(order_id)
        .execute(db)
        .await
        .map_err(to_update_err)?;

    info!("Order committed: order_id={}", order_id);
    Ok(())
}

/// 反映済み在庫を戻し、注文を cancelled / rolled_back にする。1 トランザクション
async fn roll_back(db: &DbPool, order_id: &str, reason: &str) -> Result<(), sqlx::Error> {
    let items = load_items(db, order_id).await?;
    let mut tx = db.begin().await?;

    sqlx::query(
        "UPDATE orders SET status = ?, commit_status = ?, commit_error = ?, updated_at = ? WHERE id = ?"
    )
    .bind(OrderStatus::Cancelled.as_str())
    .bind(CommitStatus::RolledBack.as_str())
    .bind(reason)
    .bind(now_ms())
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

    for item in &items {
        inventory::release_order_item(&mut tx, &item.id).await?;
    }
    tx.commit().await?;

    warn!("Order rolled back: order_id={}, reason={}", order_id, reason);
    Ok(())
}

async fn load_items(db: &DbPool, order_id: &str) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_items WHERE order_id = ? ORDER BY line_no")
        .bind(order_id)
        .fetch_all(db)
        .await
}

async fn mark(
    conn: &mut sqlx::SqliteConnection,
    order_id: &str,
    status: CommitStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET commit_status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(now_ms())
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
