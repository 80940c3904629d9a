//! Employees API Handlers
//! /api/employees エンドポイント

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{conflict_on_unique, AppError};
use crate::models::{
    CreateEmployeeRequest, Employee, EmployeeResponse, EmployeeRole, UpdateEmployeeRequest,
};
use crate::now_ms;
use crate::AppState;

#[derive(Serialize)]
pub struct EmployeeListResponse {
    pub success: bool,
    pub employees: Vec<EmployeeResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct EmployeeDetailResponse {
    pub success: bool,
    pub employee: EmployeeResponse,
}

/// GET /api/employees
pub async fn list_employees(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EmployeeListResponse>, AppError> {
    let employees: Vec<Employee> = sqlx::query_as("SELECT * FROM employees ORDER BY name ASC")
        .fetch_all(&state.db)
        .await?;

    let employees = employees
        .iter()
        .map(EmployeeResponse::from_employee)
        .collect::<Result<Vec<_>, _>>()?;
    let total = employees.len();
    Ok(Json(EmployeeListResponse { success: true, employees, total }))
}

/// GET /api/employees/:id
pub async fn get_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EmployeeDetailResponse>, AppError> {
    let employee = find_employee(&state, &id).await?;
    Ok(Json(EmployeeDetailResponse {
        success: true,
        employee: EmployeeResponse::from_employee(&employee)?,
    }))
}

/// POST /api/employees
pub async fn create_employee(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEmployeeRequest>,
) -> Result<Json<EmployeeDetailResponse>, AppError> {
    let name = req.name.trim();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::Validation(format!("invalid email: {}", req.email)));
    }

    let now = now_ms();
    let employee = Employee {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email,
        role: req.role.unwrap_or(EmployeeRole::Staff).as_str().to_string(),
        active: true,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(r#"
        INSERT INTO employees (id, name, email, role, active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&employee.id)
    .bind(&employee.name)
    .bind(&employee.email)
    .bind(&employee.role)
    .bind(employee.active)
    .bind(employee.created_at)
    .bind(employee.updated_at)
    .execute(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, || format!("email {} is already in use", employee.email)))?;

    info!("Employee created: id={}, role={}", employee.id, employee.role);
    Ok(Json(EmployeeDetailResponse {
        success: true,
        employee: EmployeeResponse::from_employee(&employee)?,
    }))
}

/// PUT /api/employees/:id - 名前・権限・有効フラグの更新
pub async fn update_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEmployeeRequest>,
) -> Result<Json<EmployeeDetailResponse>, AppError> {
    let name = req.name.as_deref().map(str::trim);
    if name == Some("") {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }

    let result = sqlx::query(r#"
        UPDATE employees SET
            name = COALESCE(?, name),
            role = COALESCE(?, role),
            active = COALESCE(?, active),
            updated_at = ?
        WHERE id = ?
    "#)
    .bind(name)
    .bind(req.role.map(|r| r.as_str()))
    .bind(req.active)
    .bind(now_ms())
    .bind(&id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Employee {}", id)));
    }

    info!("Employee updated: id={}", id);
    let employee = find_employee(&state, &id).await?;
    Ok(Json(EmployeeDetailResponse {
        success: true,
        employee: EmployeeResponse::from_employee(&employee)?,
    }))
}

async fn find_employee(state: &AppState, id: &str) -> Result<Employee, AppError> {
    sqlx::query_as("SELECT * FROM employees WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Employee {}", id)))
}
