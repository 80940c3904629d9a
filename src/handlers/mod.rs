//! API Handlers

pub mod customers;
pub mod employees;
pub mod invoices;
pub mod issues;
pub mod orders;
pub mod platforms;
pub mod pricing;

use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: String,
    pub service: String,
    pub version: String,
    /// 設定警告（ダッシュボードのバナー表示用）
    pub warnings: Vec<String>,
}

/// GET /api/health - ヘルスチェック（認証不要）
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        warnings: state.config.warnings.clone(),
    })
}
