//! Reseller Admin API
//!
//! 顧客・プラットフォーム在庫・価格ティア・注文を管理する管理用 API。

pub mod auth;
pub mod commit;
pub mod composer;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod inventory;
pub mod models;
pub mod money;
pub mod orders;
pub mod pricing;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::commit::OrderNumbers;
use crate::config::AppConfig;
use crate::db::DbPool;

/// 現在時刻（unix ms）
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 全ハンドラ共通の状態
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub order_numbers: OrderNumbers,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        Self {
            db,
            config,
            order_numbers: OrderNumbers::new(),
        }
    }
}

/// ルーター構築
pub fn router(state: Arc<AppState>) -> Router {
    use handlers::{customers, employees, invoices, issues, orders, platforms, pricing};

    let api = Router::new()
        // Customers
        .route("/api/customers", get(customers::list_customers).post(customers::create_customer))
        .route(
            "/api/customers/:id",
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::delete_customer),
        )
        .route(
            "/api/customers/:id/usernames",
            get(customers::list_usernames).post(customers::add_username),
        )
        .route("/api/customers/:id/usernames/:username_id", delete(customers::delete_username))
        // Platforms / Inventory
        .route("/api/platforms", get(platforms::list_platforms).post(platforms::create_platform))
        .route("/api/platforms/low-stock", get(platforms::low_stock))
        .route(
            "/api/platforms/:id",
            get(platforms::get_platform)
                .put(platforms::update_platform)
                .delete(platforms::delete_platform),
        )
        .route("/api/platforms/:id/restore", post(platforms::restore_platform))
        .route(
            "/api/platforms/:id/purchases",
            get(platforms::list_purchases).post(platforms::record_purchase),
        )
        // Pricing
        .route("/api/pricing/resolve", get(pricing::resolve))
        .route("/api/pricing-tiers", get(pricing::list_tiers).post(pricing::create_tier))
        .route("/api/pricing-tiers/:id", delete(pricing::delete_tier))
        // Orders
        .route("/api/orders", get(orders::list_orders).post(orders::commit))
        .route("/api/orders/quote", post(orders::quote))
        .route("/api/orders/:id", get(orders::get_order))
        .route("/api/orders/:id/status", put(orders::update_status))
        .route("/api/orders/:id/resume", post(orders::resume))
        .route("/api/orders/:id/abandon", post(orders::abandon))
        .route("/api/orders/:id/items/:item_id", put(orders::correct_item))
        .route("/api/orders/:id/invoice", post(invoices::upload_invoice))
        // Employees
        .route("/api/employees", get(employees::list_employees).post(employees::create_employee))
        .route("/api/employees/:id", get(employees::get_employee).put(employees::update_employee))
        // Support issues
        .route("/api/issues", get(issues::list_issues).post(issues::create_issue))
        .route("/api/issues/:id", get(issues::get_issue).put(issues::update_issue))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_access_key));

    let invoice_dir = state.config.data_dir.join(invoices::INVOICE_DIR);

    Router::new()
        .route("/api/health", get(handlers::health_check))
        .merge(api)
        .nest_service("/invoices", ServeDir::new(invoice_dir))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
