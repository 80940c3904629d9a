//! Orders API Handlers
//! /api/orders エンドポイント

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::commit;
use crate::error::AppError;
use crate::models::{
    CommitOrderRequest, CorrectOrderItemRequest, OrderResponse, OrderStatus, QuoteRequest,
    QuoteResponse, UpdateOrderStatusRequest,
};
use crate::orders;
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct OrderListResponse {
    pub success: bool,
    pub orders: Vec<OrderResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct OrderDetailResponse {
    pub success: bool,
    pub order: OrderResponse,
}

// ========================================
// Query Parameters
// ========================================

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<String>,
}

// ========================================
// Handlers
// ========================================

/// GET /api/orders?status&customer_id - 注文一覧
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, AppError> {
    let orders = orders::list_orders(&state.db, query.status, query.customer_id.as_deref()).await?;
    let total = orders.len();
    Ok(Json(OrderListResponse { success: true, orders, total }))
}

/// GET /api/orders/:id - 注文詳細（明細・支払い詳細つき）
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailResponse>, AppError> {
    Ok(detail(orders::load_order(&state.db, &id).await?))
}

/// POST /api/orders/quote - 見積もり（書き込みなし）
pub async fn quote(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    Ok(Json(orders::quote(&state.db, &req).await?))
}

/// POST /api/orders - 注文コミット
///
/// 失敗時は `code` で段階を区別し、ヘッダ保存後の失敗では `order_id` も返す。
pub async fn commit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommitOrderRequest>,
) -> Result<Json<OrderDetailResponse>, AppError> {
    let order = commit::commit_order(&state.db, &state.order_numbers, req).await?;
    info!("✅ Order created: {} ({})", order.order_number, order.id);
    Ok(detail(orders::to_response(&state.db, &order).await?))
}

/// POST /api/orders/:id/resume - 途中で止まったコミットの再開
pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailResponse>, AppError> {
    let order = commit::resume_commit(&state.db, &id).await?;
    Ok(detail(orders::to_response(&state.db, &order).await?))
}

/// POST /api/orders/:id/abandon - 途中で止まったコミットの取り消し
pub async fn abandon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailResponse>, AppError> {
    let order = commit::abandon_commit(&state.db, &id).await?;
    Ok(detail(orders::to_response(&state.db, &order).await?))
}

/// PUT /api/orders/:id/status - ステータス変更
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderDetailResponse>, AppError> {
    let order = orders::change_status(&state.db, &id, req.status).await?;
    Ok(detail(orders::to_response(&state.db, &order).await?))
}

/// PUT /api/orders/:id/items/:item_id - 明細修正
pub async fn correct_item(
    State(state): State<Arc<AppState>>,
    Path((id, item_id)): Path<(String, String)>,
    Json(req): Json<CorrectOrderItemRequest>,
) -> Result<Json<OrderDetailResponse>, AppError> {
    let order = orders::correct_item(&state.db, &id, &item_id, &req).await?;
    Ok(detail(orders::to_response(&state.db, &order).await?))
}

fn detail(order: OrderResponse) -> Json<OrderDetailResponse> {
    Json(OrderDetailResponse { success: true, order })
}
