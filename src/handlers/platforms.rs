//! Platforms API Handlers
//! /api/platforms エンドポイント（在庫の仕入れ・低在庫一覧を含む）

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::inventory;
use crate::models::{
    CreatePlatformRequest, Platform, PlatformResponse, PlatformState, PurchaseRequest,
    PurchaseResponse, UpdatePlatformRequest,
};
use crate::money::to_cents;
use crate::now_ms;
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct PlatformListResponse {
    pub success: bool,
    pub platforms: Vec<PlatformResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct PlatformDetailResponse {
    pub success: bool,
    pub platform: PlatformResponse,
}

#[derive(Serialize)]
pub struct PurchaseListResponse {
    pub success: bool,
    pub purchases: Vec<PurchaseResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct PurchaseSavedResponse {
    pub success: bool,
    pub purchase: PurchaseResponse,
}

// ========================================
// Query Parameters
// ========================================

#[derive(Debug, Deserialize)]
pub struct ListPlatformsQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

// ========================================
// Handlers
// ========================================

/// GET /api/platforms - Platform一覧（既定は有効なもののみ）
pub async fn list_platforms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPlatformsQuery>,
) -> Result<Json<PlatformListResponse>, AppError> {
    let platforms: Vec<Platform> = if query.include_deleted {
        sqlx::query_as("SELECT * FROM platforms ORDER BY platform ASC, account_type ASC")
            .fetch_all(&state.db)
            .await
    } else {
        sqlx::query_as(
            "SELECT * FROM platforms WHERE deleted_at IS NULL ORDER BY platform ASC, account_type ASC"
        )
        .fetch_all(&state.db)
        .await
    }?;

    Ok(Json(platform_list(&platforms)))
}

/// GET /api/platforms/low-stock - 低在庫一覧
pub async fn low_stock(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PlatformListResponse>, AppError> {
    let platforms = inventory::low_stock(&state.db).await?;
    Ok(Json(platform_list(&platforms)))
}

/// GET /api/platforms/:id - Platform詳細（削除済みも返す）
pub async fn get_platform(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PlatformDetailResponse>, AppError> {
    let platform = find_any(&state, &id).await?;
    Ok(Json(PlatformDetailResponse {
        success: true,
        platform: PlatformResponse::from_platform(&platform),
    }))
}

/// POST /api/platforms - Platform作成
pub async fn create_platform(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePlatformRequest>,
) -> Result<Json<PlatformDetailResponse>, AppError> {
    let name = req.platform.trim();
    let account_type = req.account_type.trim();
    if name.is_empty() || account_type.is_empty() {
        return Err(AppError::Validation("platform and account_type are required".to_string()));
    }
    if req.inventory < 0 {
        return Err(AppError::Validation("inventory must not be negative".to_string()));
    }
    if req.low_stock_alert < 0 {
        return Err(AppError::Validation("low_stock_alert must not be negative".to_string()));
    }
    let cost_price_cents = non_negative_cents("cost_price", req.cost_price)?;

    let now = now_ms();
    let platform = Platform {
        id: Uuid::new_v4().to_string(),
        platform: name.to_string(),
        account_type: account_type.to_string(),
        inventory: req.inventory,
        cost_price_cents,
        low_stock_alert: req.low_stock_alert,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    sqlx::query(r#"
        INSERT INTO platforms (
            id, platform, account_type, inventory, cost_price_cents,
            low_stock_alert, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&platform.id)
    .bind(&platform.platform)
    .bind(&platform.account_type)
    .bind(platform.inventory)
    .bind(platform.cost_price_cents)
    .bind(platform.low_stock_alert)
    .bind(platform.created_at)
    .bind(platform.updated_at)
    .execute(&state.db)
    .await?;

    info!(
        "Platform created: id={}, {} / {}, inventory={}",
        platform.id, platform.platform, platform.account_type, platform.inventory
    );

    Ok(Json(PlatformDetailResponse {
        success: true,
        platform: PlatformResponse::from_platform(&platform),
    }))
}

/// PUT /api/platforms/:id - Platform更新（在庫は変更不可）
pub async fn update_platform(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePlatformRequest>,
) -> Result<Json<PlatformDetailResponse>, AppError> {
    let name = req.platform.as_deref().map(str::trim);
    let account_type = req.account_type.as_deref().map(str::trim);
    if name == Some("") || account_type == Some("") {
        return Err(AppError::Validation("platform and account_type must not be empty".to_string()));
    }
    if req.low_stock_alert.map_or(false, |n| n < 0) {
        return Err(AppError::Validation("low_stock_alert must not be negative".to_string()));
    }
    let cost_price_cents = req
        .cost_price
        .map(|p| non_negative_cents("cost_price", p))
        .transpose()?;

    let result = sqlx::query(r#"
        UPDATE platforms SET
            platform = COALESCE(?, platform),
            account_type = COALESCE(?, account_type),
            cost_price_cents = COALESCE(?, cost_price_cents),
            low_stock_alert = COALESCE(?, low_stock_alert),
            updated_at = ?
        WHERE id = ? AND deleted_at IS NULL
    "#)
    .bind(name)
    .bind(account_type)
    .bind(cost_price_cents)
    .bind(req.low_stock_alert)
    .bind(now_ms())
    .bind(&id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(match find_any(&state, &id).await?.state() {
            PlatformState::Deleted => AppError::Conflict(format!("platform {} is deleted", id)),
            PlatformState::Active => AppError::NotFound(format!("Platform {}", id)),
        });
    }

    info!("Platform updated: id={}", id);

    let platform = find_any(&state, &id).await?;
    Ok(Json(PlatformDetailResponse {
        success: true,
        platform: PlatformResponse::from_platform(&platform),
    }))
}

/// DELETE /api/platforms/:id - 論理削除
pub async fn delete_platform(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PlatformDetailResponse>, AppError> {
    transition(&state, &id, PlatformState::Deleted).await
}

/// POST /api/platforms/:id/restore - 論理削除の取り消し
pub async fn restore_platform(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PlatformDetailResponse>, AppError> {
    transition(&state, &id, PlatformState::Active).await
}

/// GET /api/platforms/:id/purchases - 仕入れ履歴
pub async fn list_purchases(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PurchaseListResponse>, AppError> {
    find_any(&state, &id).await?;
    let records = inventory::purchase_history(&state.db, &id).await?;
    let purchases: Vec<PurchaseResponse> = records.iter().map(PurchaseResponse::from_record).collect();
    let total = purchases.len();
    Ok(Json(PurchaseListResponse { success: true, purchases, total }))
}

/// POST /api/platforms/:id/purchases - 仕入れ（在庫加算 + 履歴）
pub async fn record_purchase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<PurchaseSavedResponse>, AppError> {
    let record = inventory::increment(&state.db, &id, &req).await?;
    Ok(Json(PurchaseSavedResponse {
        success: true,
        purchase: PurchaseResponse::from_record(&record),
    }))
}

// ========================================
// Helper Functions
// ========================================

async fn find_any(state: &AppState, id: &str) -> Result<Platform, AppError> {
    sqlx::query_as("SELECT * FROM platforms WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Platform {}", id)))
}

/// active ⇄ deleted。同じ状態への遷移は 409
async fn transition(
    state: &AppState,
    id: &str,
    target: PlatformState,
) -> Result<Json<PlatformDetailResponse>, AppError> {
    let now = now_ms();
    let result = match target {
        PlatformState::Deleted => {
            sqlx::query("UPDATE platforms SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(&state.db)
                .await?
        }
        PlatformState::Active => {
            sqlx::query("UPDATE platforms SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL")
                .bind(now)
                .bind(id)
                .execute(&state.db)
                .await?
        }
    };

    let platform = find_any(state, id).await?;
    if result.rows_affected() == 0 {
        warn!("Platform {} is already {:?}", id, platform.state());
        return Err(AppError::Conflict(format!(
            "platform {} is already {}",
            id,
            match platform.state() {
                PlatformState::Active => "active",
                PlatformState::Deleted => "deleted",
            }
        )));
    }

    info!("Platform {:?}: id={}", target, id);
    Ok(Json(PlatformDetailResponse {
        success: true,
        platform: PlatformResponse::from_platform(&platform),
    }))
}

fn platform_list(platforms: &[Platform]) -> PlatformListResponse {
    let platforms: Vec<PlatformResponse> = platforms.iter().map(PlatformResponse::from_platform).collect();
    let total = platforms.len();
    PlatformListResponse { success: true, platforms, total }
}

fn non_negative_cents(field: &str, amount: Decimal) -> Result<i64, AppError> {
    if amount < Decimal::ZERO {
        return Err(AppError::Validation(format!("{} must not be negative", field)));
    }
    Ok(to_cents(amount)?)
}
