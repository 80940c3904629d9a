//! Pricing API Handlers
//! /api/pricing/resolve と /api/pricing-tiers エンドポイント

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
use crate::models::{CreatePricingTierRequest, PricingTier, PricingTierResponse};
use crate::money::to_cents;
use crate::now_ms;
use crate::pricing::{self, PriceResolution};
use crate::AppState;

#[derive(Serialize)]
pub struct ResolveResponse {
    pub success: bool,
    #[serde(flatten)]
    pub resolution: PriceResolution,
    /// ティアが無いときに使う原価
    pub fallback_unit_price: Decimal,
}

#[derive(Serialize)]
pub struct TierListResponse {
    pub success: bool,
    pub pricing_tiers: Vec<PricingTierResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct TierSavedResponse {
    pub success: bool,
    pub pricing_tier: PricingTierResponse,
}

#[derive(Serialize)]
pub struct TierDeletedResponse {
    pub success: bool,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub customer_id: String,
    pub platform_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListTiersQuery {
    pub customer_id: Option<String>,
    pub platform_id: Option<String>,
}

/// GET /api/pricing/resolve?customer_id&platform_id&quantity
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, AppError> {
    if query.quantity < 1 {
        return Err(AppError::Validation("quantity must be at least 1".to_string()));
    }
    let platform = inventory::get(&state.db, &query.platform_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Platform {}", query.platform_id)))?;

    let resolution =
        pricing::resolve_price(&state.db, &query.customer_id, &platform.id, query.quantity).await?;

    Ok(Json(ResolveResponse {
        success: true,
        resolution,
        fallback_unit_price: platform.cost_price(),
    }))
}

/// GET /api/pricing-tiers - ティア一覧
pub async fn list_tiers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTiersQuery>,
) -> Result<Json<TierListResponse>, AppError> {
    let tiers: Vec<PricingTier> = sqlx::query_as(r#"
        SELECT * FROM pricing_tiers
        WHERE (? IS NULL OR customer_id = ?) AND (? IS NULL OR platform_id = ?)
        ORDER BY customer_id, platform_id, min_quantity, created_at
    "#)
    .bind(&query.customer_id)
    .bind(&query.customer_id)
    .bind(&query.platform_id)
    .bind(&query.platform_id)
    .fetch_all(&state.db)
    .await?;

    let pricing_tiers: Vec<PricingTierResponse> = tiers.iter().map(PricingTierResponse::from_tier).collect();
    let total = pricing_tiers.len();
    Ok(Json(TierListResponse { success: true, pricing_tiers, total }))
}

/// POST /api/pricing-tiers - ティア作成（範囲の重複は警告のみ）
pub async fn create_tier(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePricingTierRequest>,
) -> Result<Json<TierSavedResponse>, AppError> {
    if req.min_quantity < 1 {
        return Err(AppError::Validation("min_quantity must be at least 1".to_string()));
    }
    if req.max_quantity.map_or(false, |max| max < req.min_quantity) {
        return Err(AppError::Validation("max_quantity must not be below min_quantity".to_string()));
    }
    if req.unit_price < Decimal::ZERO {
        return Err(AppError::Validation("unit_price must not be negative".to_string()));
    }
    let unit_price_cents = to_cents(req.unit_price)?;

    let customer: Option<(String,)> = sqlx::query_as("SELECT id FROM customers WHERE id = ?")
        .bind(&req.customer_id)
        .fetch_optional(&state.db)
        .await?;
    if customer.is_none() {
        return Err(AppError::Validation(format!("customer not found: {}", req.customer_id)));
    }
    if inventory::get(&state.db, &req.platform_id).await?.is_none() {
        return Err(AppError::Validation(format!("platform not found: {}", req.platform_id)));
    }

    let tier = PricingTier {
        id: Uuid::new_v4().to_string(),
        customer_id: req.customer_id,
        platform_id: req.platform_id,
        min_quantity: req.min_quantity,
        max_quantity: req.max_quantity,
        unit_price_cents,
        is_default: req.is_default,
        created_at: now_ms(),
    };

    let existing = pricing::load_tiers(&state.db, &tier.customer_id, &tier.platform_id).await?;
    for other in existing.iter().filter(|t| overlaps(t, &tier)) {
        warn!(
            "Pricing tier overlaps existing tier {} ({}..{:?}) for customer={}, platform={}",
            other.id, other.min_quantity, other.max_quantity, tier.customer_id, tier.platform_id
        );
    }

    sqlx::query(r#"
        INSERT INTO pricing_tiers (
            id, customer_id, platform_id, min_quantity, max_quantity,
            unit_price_cents, is_default, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&tier.id)
    .bind(&tier.customer_id)
    .bind(&tier.platform_id)
    .bind(tier.min_quantity)
    .bind(tier.max_quantity)
    .bind(tier.unit_price_cents)
    .bind(tier.is_default)
    .bind(tier.created_at)
    .execute(&state.db)
    .await?;

    info!(
        "Pricing tier created: id={}, customer={}, platform={}, range={}..{:?}, unit_price={}",
        tier.id, tier.customer_id, tier.platform_id, tier.min_quantity, tier.max_quantity, tier.unit_price()
    );

    Ok(Json(TierSavedResponse {
        success: true,
        pricing_tier: PricingTierResponse::from_tier(&tier),
    }))
}

/// DELETE /api/pricing-tiers/:id
pub async fn delete_tier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TierDeletedResponse>, AppError> {
    let result = sqlx::query("DELETE FROM pricing_tiers WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Pricing tier {}", id)));
    }

    info!("Pricing tier deleted: id={}", id);
    Ok(Json(TierDeletedResponse { success: true, id }))
}

fn overlaps(a: &PricingTier, b: &PricingTier) -> bool {
    let a_max = a.max_quantity.unwrap_or(i64::MAX);
    let b_max = b.max_quantity.unwrap_or(i64::MAX);
    a.min_quantity <= b_max && b.min_quantity <= a_max
}
