//! Customers API Handlers
//! /api/customers エンドポイント

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{conflict_on_unique, AppError};
use crate::inventory;
use crate::models::{
    AddUsernameRequest, CreateCustomerRequest, Customer, CustomerResponse, PlatformUsername,
    PricingTier, PricingTierResponse, UpdateCustomerRequest,
};
use crate::now_ms;
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct CustomerListResponse {
    pub success: bool,
    pub customers: Vec<CustomerResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct CustomerDetailResponse {
    pub success: bool,
    pub customer: CustomerResponse,
    pub pricing_tiers: Vec<PricingTierResponse>,
    pub usernames: Vec<PlatformUsername>,
}

#[derive(Serialize)]
pub struct CustomerSavedResponse {
    pub success: bool,
    pub customer: CustomerResponse,
}

#[derive(Serialize)]
pub struct UsernameListResponse {
    pub success: bool,
    pub usernames: Vec<PlatformUsername>,
}

#[derive(Serialize)]
pub struct UsernameSavedResponse {
    pub success: bool,
    pub username: PlatformUsername,
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub success: bool,
    pub id: String,
}

// ========================================
// Handlers
// ========================================

/// GET /api/customers - Customer一覧取得
pub async fn list_customers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CustomerListResponse>, AppError> {
    let customers: Vec<Customer> = sqlx::query_as("SELECT * FROM customers ORDER BY name ASC, created_at ASC")
        .fetch_all(&state.db)
        .await?;

    let customers = customers
        .iter()
        .map(CustomerResponse::from_customer)
        .collect::<Result<Vec<_>, _>>()?;

    let total = customers.len();
    Ok(Json(CustomerListResponse { success: true, customers, total }))
}

/// GET /api/customers/:id - Customer詳細（価格ティアとユーザー名を含む）
pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CustomerDetailResponse>, AppError> {
    let customer = find_customer(&state, &id).await?;

    let tiers: Vec<PricingTier> = sqlx::query_as(
        "SELECT * FROM pricing_tiers WHERE customer_id = ? ORDER BY platform_id, min_quantity"
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await?;

    let usernames = load_usernames(&state, &id).await?;

    Ok(Json(CustomerDetailResponse {
        success: true,
        customer: CustomerResponse::from_customer(&customer)?,
        pricing_tiers: tiers.iter().map(PricingTierResponse::from_tier).collect(),
        usernames,
    }))
}

/// POST /api/customers - Customer作成
pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCustomerRequest>,
) -> Result<Json<CustomerSavedResponse>, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }

    let now = now_ms();
    let customer = Customer {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        contact_numbers: contacts_json(&req.contact_numbers)?,
        notes: req.notes,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(r#"
        INSERT INTO customers (id, name, contact_numbers, notes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
    "#)
    .bind(&customer.id)
    .bind(&customer.name)
    .bind(&customer.contact_numbers)
    .bind(&customer.notes)
    .bind(customer.created_at)
    .bind(customer.updated_at)
    .execute(&state.db)
    .await?;

    info!("Customer created: id={}, name={}", customer.id, customer.name);

    Ok(Json(CustomerSavedResponse {
        success: true,
        customer: CustomerResponse::from_customer(&customer)?,
    }))
}

/// PUT /api/customers/:id - Customer更新
pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCustomerRequest>,
) -> Result<Json<CustomerSavedResponse>, AppError> {
    find_customer(&state, &id).await?;

    let name = req.name.as_deref().map(str::trim);
    if name == Some("") {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    let contacts = req.contact_numbers.as_deref().map(contacts_json).transpose()?;

    sqlx::query(r#"
        UPDATE customers SET
            name = COALESCE(?, name),
            contact_numbers = COALESCE(?, contact_numbers),
            notes = COALESCE(?, notes),
            updated_at = ?
        WHERE id = ?
    "#)
    .bind(name)
    .bind(contacts)
    .bind(&req.notes)
    .bind(now_ms())
    .bind(&id)
    .execute(&state.db)
    .await?;

    info!("Customer updated: id={}", id);

    let customer = find_customer(&state, &id).await?;
    Ok(Json(CustomerSavedResponse {
        success: true,
        customer: CustomerResponse::from_customer(&customer)?,
    }))
}

/// DELETE /api/customers/:id - Customer削除（注文は customer_id = NULL で残る）
pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    let result = sqlx::query("DELETE FROM customers WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Customer {}", id)));
    }

    info!("🗑️  Customer deleted: id={}", id);
    Ok(Json(DeletedResponse { success: true, id }))
}

/// GET /api/customers/:id/usernames
pub async fn list_usernames(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UsernameListResponse>, AppError> {
    find_customer(&state, &id).await?;
    Ok(Json(UsernameListResponse {
        success: true,
        usernames: load_usernames(&state, &id).await?,
    }))
}

/// POST /api/customers/:id/usernames
pub async fn add_username(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddUsernameRequest>,
) -> Result<Json<UsernameSavedResponse>, AppError> {
    find_customer(&state, &id).await?;

    let username = req.username.trim();
    if username.is_empty() {
        return Err(AppError::Validation("username is required".to_string()));
    }
    if inventory::get(&state.db, &req.platform_id).await?.is_none() {
        return Err(AppError::Validation(format!("platform not found: {}", req.platform_id)));
    }

    let record = PlatformUsername {
        id: Uuid::new_v4().to_string(),
        customer_id: id,
        platform_id: req.platform_id,
        username: username.to_string(),
        created_at: now_ms(),
    };

    sqlx::query(r#"
        INSERT INTO platform_usernames (id, customer_id, platform_id, username, created_at)
        VALUES (?, ?, ?, ?, ?)
    "#)
    .bind(&record.id)
    .bind(&record.customer_id)
    .bind(&record.platform_id)
    .bind(&record.username)
    .bind(record.created_at)
    .execute(&state.db)
    .await
    .map_err(|e| {
        conflict_on_unique(e, || format!("username {} is already registered", record.username))
    })?;

    info!(
        "Username added: customer={}, platform={}, username={}",
        record.customer_id, record.platform_id, record.username
    );
    Ok(Json(UsernameSavedResponse { success: true, username: record }))
}

/// DELETE /api/customers/:id/usernames/:username_id
pub async fn delete_username(
    State(state): State<Arc<AppState>>,
    Path((id, username_id)): Path<(String, String)>,
) -> Result<Json<DeletedResponse>, AppError> {
    let result = sqlx::query("DELETE FROM platform_usernames WHERE id = ? AND customer_id = ?")
        .bind(&username_id)
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Username {}", username_id)));
    }

    info!("Username deleted: customer={}, id={}", id, username_id);
    Ok(Json(DeletedResponse { success: true, id: username_id }))
}

// ========================================
// Helper Functions
// ========================================

async fn find_customer(state: &AppState, id: &str) -> Result<Customer, AppError> {
    sqlx::query_as("SELECT * FROM customers WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Customer {}", id)))
}

async fn load_usernames(state: &AppState, customer_id: &str) -> Result<Vec<PlatformUsername>, AppError> {
    Ok(sqlx::query_as(
        "SELECT * FROM platform_usernames WHERE customer_id = ? ORDER BY platform_id, username"
    )
    .bind(customer_id)
    .fetch_all(&state.db)
    .await?)
}

/// 空白を除いた連絡先を JSON 配列にする
fn contacts_json(numbers: &[String]) -> Result<String, AppError> {
    let cleaned: Vec<&str> = numbers
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();
    serde_json::to_string(&cleaned).map_err(|e| AppError::Data(e.to_string()))
}
