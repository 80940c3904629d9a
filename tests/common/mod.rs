#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use reseller_admin::config::AppConfig;
use reseller_admin::db::{init_db, DbPool};
use reseller_admin::models::{CommitOrderRequest, OrderItemInput, PaymentDetails};
use reseller_admin::{now_ms, router, AppState};

pub struct TestApp {
    pub state: Arc<AppState>,
    pub data_dir: TempDir,
}

impl TestApp {
    pub fn db(&self) -> &DbPool {
        &self.state.db
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }
}

pub async fn setup() -> TestApp {
    setup_with(|_| {}).await
}

pub async fn setup_with(adjust: impl FnOnce(&mut AppConfig)) -> TestApp {
    let data_dir = TempDir::new().unwrap();
    let mut config = AppConfig::in_memory(data_dir.path().to_path_buf());
    adjust(&mut config);
    let db = init_db(&config.database_url).await.unwrap();
    TestApp {
        state: Arc::new(AppState::new(db, config)),
        data_dir,
    }
}

// ========================================
// Seed data
// ========================================

pub async fn seed_customer(db: &DbPool, name: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query("INSERT INTO customers (id, name, contact_numbers, created_at, updated_at) VALUES (?, ?, '[]', ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(db)
        .await
        .unwrap();
    id
}

pub async fn seed_platform(db: &DbPool, name: &str, inventory: i64, cost_price_cents: i64) -> String {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(r#"
        INSERT INTO platforms (id, platform, account_type, inventory, cost_price_cents, low_stock_alert, created_at, updated_at)
        VALUES (?, ?, 'standard', ?, ?, 10, ?, ?)
    "#)
    .bind(&id)
    .bind(name)
    .bind(inventory)
    .bind(cost_price_cents)
    .bind(now)
    .bind(now)
    .execute(db)
    .await
    .unwrap();
    id
}

pub async fn seed_tier(
    db: &DbPool,
    customer_id: &str,
    platform_id: &str,
    min: i64,
    max: Option<i64>,
    unit_price_cents: i64,
) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query(r#"
        INSERT INTO pricing_tiers (id, customer_id, platform_id, min_quantity, max_quantity, unit_price_cents, is_default, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?)
    "#)
    .bind(&id)
    .bind(customer_id)
    .bind(platform_id)
    .bind(min)
    .bind(max)
    .bind(unit_price_cents)
    .bind(now_ms())
    .execute(db)
    .await
    .unwrap();
    id
}

pub async fn inventory_of(db: &DbPool, platform_id: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as("SELECT inventory FROM platforms WHERE id = ?")
        .bind(platform_id)
        .fetch_one(db)
        .await
        .unwrap();
    n
}

/// 指定テーブルへの INSERT を失敗させる
pub async fn fail_inserts_into(db: &DbPool, table: &str) {
    sqlx::query(&format!(
        "CREATE TRIGGER fail_{table} BEFORE INSERT ON {table} BEGIN SELECT RAISE(ABORT, 'simulated outage'); END;"
    ))
    .execute(db)
    .await
    .unwrap();
}

pub async fn restore_inserts_into(db: &DbPool, table: &str) {
    sqlx::query(&format!("DROP TRIGGER fail_{table}"))
        .execute(db)
        .await
        .unwrap();
}

// ========================================
// Requests
// ========================================

pub fn cash() -> PaymentDetails {
    PaymentDetails::Cash {
        cash_received_by: "alice".to_string(),
        cash_receipt_number: Some("R-001".to_string()),
        notes: None,
    }
}

pub fn item(platform_id: &str, quantity: i64) -> OrderItemInput {
    OrderItemInput {
        platform_id: platform_id.to_string(),
        quantity,
        unit_price: None,
    }
}

pub fn order_request(customer_id: &str, items: Vec<OrderItemInput>, discount: Decimal) -> CommitOrderRequest {
    CommitOrderRequest {
        customer_id: Some(customer_id.to_string()),
        items,
        payment: cash(),
        discount_amount: discount,
        created_by: None,
        idempotency_key: None,
    }
}

pub async fn send(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with(app.router(), method, uri, body, &[]).await
}

pub async fn send_with(
    router: Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
