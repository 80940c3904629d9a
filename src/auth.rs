//! Access Key Middleware
//! ADMIN_ACCESS_KEY が設定されていれば `x-access-key` ヘッダを要求する

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::AppState;

pub const ACCESS_KEY_HEADER: &str = "x-access-key";

pub async fn require_access_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.access_key.as_deref() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(ACCESS_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if keys_match(key, expected) => next.run(req).await,
        _ => AppError::Unauthorized.into_response(),
    }
}

/// ハッシュ同士で比較（長さで早期終了しない）
fn keys_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_comparison() {
        assert!(keys_match("0123456789abcdef", "0123456789abcdef"));
        assert!(!keys_match("0123456789abcdeX", "0123456789abcdef"));
        assert!(!keys_match("", "0123456789abcdef"));
    }
}
