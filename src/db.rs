//! Database Module
//! SQLite を使用した customers/platforms/tiers/orders/payments/employees/issues の管理

use std::str::FromStr;

use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite,
};
use tracing::info;

/// データベース接続プール
pub type DbPool = Pool<Sqlite>;

/// データベースを初期化
pub async fn init_db(database_url: &str) -> Result<DbPool> {
    info!("Initializing database: {}", database_url);

    let in_memory = database_url.contains(":memory:");
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // インメモリ DB は接続ごとに別物になるので 1 本を使い回す
    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options.journal_mode(SqliteJournalMode::Wal))
            .await?
    };

    // スキーマ作成
    create_schema(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// スキーマ作成
async fn create_schema(pool: &DbPool) -> Result<()> {
    // customers テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            contact_numbers TEXT NOT NULL DEFAULT '[]',
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // platforms テーブル（deleted_at で論理削除）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS platforms (
            id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            account_type TEXT NOT NULL,
            inventory INTEGER NOT NULL DEFAULT 0 CHECK (inventory >= 0),
            cost_price_cents INTEGER NOT NULL DEFAULT 0,
            low_stock_alert INTEGER NOT NULL DEFAULT 10,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        )
    "#)
    .execute(pool)
    .await?;

    // platform_usernames テーブル（顧客のプラットフォーム上のユーザー名）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS platform_usernames (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            platform_id TEXT NOT NULL,
            username TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (customer_id) REFERENCES customers(id) ON DELETE CASCADE,
            FOREIGN KEY (platform_id) REFERENCES platforms(id),
            UNIQUE(customer_id, platform_id, username)
        )
    "#)
    .execute(pool)
    .await?;

    // pricing_tiers テーブル（重複範囲は書き込み時に禁止しない）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS pricing_tiers (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            platform_id TEXT NOT NULL,
            min_quantity INTEGER NOT NULL DEFAULT 1 CHECK (min_quantity >= 1),
            max_quantity INTEGER,
            unit_price_cents INTEGER NOT NULL CHECK (unit_price_cents >= 0),
            is_default INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (customer_id) REFERENCES customers(id) ON DELETE CASCADE,
            FOREIGN KEY (platform_id) REFERENCES platforms(id)
        )
    "#)
    .execute(pool)
    .await?;

    // employees テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS employees (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL DEFAULT 'staff',
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // orders テーブル（commit_status でコミット手順の進捗を記録）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            order_number TEXT NOT NULL UNIQUE,
            customer_id TEXT,
            payment_method TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            subtotal_cents INTEGER NOT NULL,
            discount_cents INTEGER NOT NULL DEFAULT 0,
            total_amount_cents INTEGER NOT NULL,
            commit_status TEXT NOT NULL DEFAULT 'header_saved',
            commit_error TEXT,
            draft_json TEXT NOT NULL,
            idempotency_key TEXT UNIQUE,
            invoice_url TEXT,
            invoice_sha256 TEXT,
            created_by TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (customer_id) REFERENCES customers(id) ON DELETE SET NULL
        )
    "#)
    .execute(pool)
    .await?;

    // order_items テーブル（単価は注文時点のスナップショット）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            platform_id TEXT NOT NULL,
            line_no INTEGER NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity >= 1),
            unit_price_cents INTEGER NOT NULL CHECK (unit_price_cents >= 0),
            total_price_cents INTEGER NOT NULL,
            inventory_applied INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (order_id) REFERENCES orders(id),
            FOREIGN KEY (platform_id) REFERENCES platforms(id),
            UNIQUE(order_id, line_no)
        )
    "#)
    .execute(pool)
    .await?;

    // payment_details テーブル（支払い方法ごとに使うカラムが異なる）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS payment_details (
            order_id TEXT PRIMARY KEY,
            payment_method TEXT NOT NULL,
            crypto_currency TEXT,
            crypto_network TEXT,
            crypto_username TEXT,
            crypto_wallet_address TEXT,
            crypto_transaction_hash TEXT,
            bank_transaction_reference TEXT,
            bank_sender_name TEXT,
            bank_sender_bank TEXT,
            bank_transaction_time TEXT,
            bank_amount_in_currency TEXT,
            bank_exchange_rate TEXT,
            currency TEXT,
            cash_received_by TEXT,
            cash_receipt_number TEXT,
            notes TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (order_id) REFERENCES orders(id)
        )
    "#)
    .execute(pool)
    .await?;

    // purchase_history テーブル（在庫追加の監査ログ）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS purchase_history (
            id TEXT PRIMARY KEY,
            platform_id TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity >= 1),
            cost_per_unit_cents INTEGER NOT NULL,
            supplier TEXT,
            previous_inventory INTEGER NOT NULL,
            new_inventory INTEGER NOT NULL,
            notes TEXT,
            created_by TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (platform_id) REFERENCES platforms(id)
        )
    "#)
    .execute(pool)
    .await?;

    // support_issues テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS support_issues (
            id TEXT PRIMARY KEY,
            ticket TEXT NOT NULL UNIQUE,
            customer_id TEXT,
            order_id TEXT,
            subject TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'open',
            resolution TEXT,
            created_by TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (customer_id) REFERENCES customers(id) ON DELETE SET NULL,
            FOREIGN KEY (order_id) REFERENCES orders(id)
        )
    "#)
    .execute(pool)
    .await?;

    // インデックス作成
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_platforms_deleted_at ON platforms(deleted_at)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tiers_customer_platform ON pricing_tiers(customer_id, platform_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_usernames_customer ON platform_usernames(customer_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_purchase_history_platform ON purchase_history(platform_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_support_issues_status ON support_issues(status)")
        .execute(pool).await?;

    Ok(())
}
