//! API Error
//! 全ハンドラ共通のエラー型と `{success:false, error}` レスポンス

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::commit::CommitError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("DB error: {0}")]
    Database(#[from] sqlx::Error),

    /// 保存済みデータが型に合わない
    #[error("Data error: {0}")]
    Data(String),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("Invoice error: {0}")]
    Invoice(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Data(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Commit(e) => e.status(),
            AppError::Invoice(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

/// UNIQUE 制約違反を 409 にする
pub fn conflict_on_unique(e: sqlx::Error, message: impl FnOnce() -> String) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(message()),
        _ => AppError::Database(e),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, order_id) = match &self {
            AppError::Commit(e) => (Some(e.code()), e.order_id().map(str::to_string)),
            _ => (None, None),
        };
        warn!("API Error: {}", self);
        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.to_string(),
                code,
                order_id,
            }),
        )
            .into_response()
    }
}
