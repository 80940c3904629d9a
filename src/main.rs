use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use reseller_admin::config::AppConfig;
use reseller_admin::db::init_db;
use reseller_admin::{router, AppState};

// ========================================
// メイン
// ========================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 設定読み込み（不正値は警告のみ）
    let config = AppConfig::from_env();
    for warning in &config.warnings {
        warn!("⚠️  Config: {}", warning);
    }

    // SQLite ファイルの親ディレクトリを用意
    if let Some(path) = config.database_url.strip_prefix("sqlite:") {
        let path = path.trim_start_matches("//").split('?').next().unwrap_or_default();
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !path.contains(":memory:") && !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {:?}", parent))?;
            }
        }
    }

    let db = init_db(&config.database_url).await?;

    let addr = config.bind_addr;
    let max_upload_mb = config.max_upload_bytes / (1024 * 1024);
    let state = Arc::new(AppState::new(db, config));

    // ルーター構築
    let app = router(state);

    info!("🚀 Reseller Admin API listening on {}", addr);
    info!("📦 Max upload size: {}MB", max_upload_mb);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
