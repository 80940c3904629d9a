//! Support Issues API Handlers
//! /api/issues エンドポイント

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{conflict_on_unique, AppError};
use crate::models::{
    CreateIssueRequest, IssueResponse, IssueStatus, SupportIssue, UpdateIssueRequest,
};
use crate::now_ms;
use crate::AppState;

#[derive(Serialize)]
pub struct IssueListResponse {
    pub success: bool,
    pub issues: Vec<IssueResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct IssueDetailResponse {
    pub success: bool,
    pub issue: IssueResponse,
}

#[derive(Debug, Deserialize)]
pub struct ListIssuesQuery {
    pub status: Option<IssueStatus>,
}

/// GET /api/issues?status
pub async fn list_issues(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListIssuesQuery>,
) -> Result<Json<IssueListResponse>, AppError> {
    let status = query.status.map(|s| s.as_str());
    let issues: Vec<SupportIssue> = sqlx::query_as(
        "SELECT * FROM support_issues WHERE (? IS NULL OR status = ?) ORDER BY created_at DESC"
    )
    .bind(status)
    .bind(status)
    .fetch_all(&state.db)
    .await?;

    let issues = issues
        .iter()
        .map(IssueResponse::from_issue)
        .collect::<Result<Vec<_>, _>>()?;
    let total = issues.len();
    Ok(Json(IssueListResponse { success: true, issues, total }))
}

/// GET /api/issues/:id
pub async fn get_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<IssueDetailResponse>, AppError> {
    let issue = find_issue(&state, &id).await?;
    Ok(Json(IssueDetailResponse {
        success: true,
        issue: IssueResponse::from_issue(&issue)?,
    }))
}

/// POST /api/issues - チケット番号を発行して登録
pub async fn create_issue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateIssueRequest>,
) -> Result<Json<IssueDetailResponse>, AppError> {
    let subject = req.subject.trim();
    if subject.is_empty() {
        return Err(AppError::Validation("subject is required".to_string()));
    }

    let now = now_ms();
    let issue = SupportIssue {
        id: Uuid::new_v4().to_string(),
        ticket: generate_ticket(),
        customer_id: req.customer_id,
        order_id: req.order_id,
        subject: subject.to_string(),
        description: req.description,
        status: IssueStatus::Open.as_str().to_string(),
        resolution: None,
        created_by: req.created_by,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(r#"
        INSERT INTO support_issues (
            id, ticket, customer_id, order_id, subject, description,
            status, resolution, created_by, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&issue.id)
    .bind(&issue.ticket)
    .bind(&issue.customer_id)
    .bind(&issue.order_id)
    .bind(&issue.subject)
    .bind(&issue.description)
    .bind(&issue.status)
    .bind(&issue.resolution)
    .bind(&issue.created_by)
    .bind(issue.created_at)
    .bind(issue.updated_at)
    .execute(&state.db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            AppError::Validation("customer or order does not exist".to_string())
        }
        _ => conflict_on_unique(e, || "ticket collision; retry".to_string()),
    })?;

    info!("Issue opened: ticket={}, subject={}", issue.ticket, issue.subject);
    Ok(Json(IssueDetailResponse {
        success: true,
        issue: IssueResponse::from_issue(&issue)?,
    }))
}

/// PUT /api/issues/:id - ステータス・対応内容の更新（closed は終端）
pub async fn update_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateIssueRequest>,
) -> Result<Json<IssueDetailResponse>, AppError> {
    let current = find_issue(&state, &id).await?;
    let current_status: IssueStatus = current.status.parse()?;
    if current_status == IssueStatus::Closed {
        return Err(AppError::Conflict(format!("issue {} is closed", current.ticket)));
    }

    let result = sqlx::query(r#"
        UPDATE support_issues SET
            status = COALESCE(?, status),
            resolution = COALESCE(?, resolution),
            updated_at = ?
        WHERE id = ? AND status = ?
    "#)
    .bind(req.status.map(|s| s.as_str()))
    .bind(&req.resolution)
    .bind(now_ms())
    .bind(&id)
    .bind(current_status.as_str())
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(format!("issue {} changed concurrently", current.ticket)));
    }

    let issue = find_issue(&state, &id).await?;
    info!("Issue updated: ticket={}, status={}", issue.ticket, issue.status);
    Ok(Json(IssueDetailResponse {
        success: true,
        issue: IssueResponse::from_issue(&issue)?,
    }))
}

async fn find_issue(state: &AppState, id: &str) -> Result<SupportIssue, AppError> {
    sqlx::query_as("SELECT * FROM support_issues WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Issue {}", id)))
}

/// チケット番号 (ISS- + base32 8文字)
fn generate_ticket() -> String {
    let random_bytes: [u8; 5] = rand::thread_rng().gen();
    let encoded = base32::encode(base32::Alphabet::Crockford, &random_bytes);
    format!("ISS-{}", &encoded[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_format() {
        let ticket = generate_ticket();
        assert_eq!(ticket.len(), 12);
        assert!(ticket.starts_with("ISS-"));
        assert!(ticket[4..].chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_lowercase()));
    }
}
