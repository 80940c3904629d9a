//! Data Models
//! Customer, Platform, PricingTier, Order などのデータ構造定義

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::composer::Totals;
use crate::error::AppError;
use crate::money::{from_cents, parse_decimal_text};

/// TEXT カラムに保存する列挙型
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(AppError::Data(format!(
                        "unknown {}: {}", stringify!($name), other
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ========================================
// Customer
// ========================================

/// Customer (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub contact_numbers: String, // JSON array
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Customer 作成リクエスト
#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    #[serde(default)]
    pub contact_numbers: Vec<String>,
    pub notes: Option<String>,
}

/// Customer 更新リクエスト
#[derive(Debug, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub contact_numbers: Option<Vec<String>>,
    pub notes: Option<String>,
}

/// Customer レスポンス（API返却用）
#[derive(Debug, Serialize)]
pub struct CustomerResponse {
    pub id: String,
    pub name: String,
    pub contact_numbers: Vec<String>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CustomerResponse {
    pub fn from_customer(c: &Customer) -> Result<Self, AppError> {
        let contact_numbers: Vec<String> = serde_json::from_str(&c.contact_numbers)
            .map_err(|e| AppError::Data(format!("contact_numbers of {}: {}", c.id, e)))?;
        Ok(Self {
            id: c.id.clone(),
            name: c.name.clone(),
            contact_numbers,
            notes: c.notes.clone(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        })
    }
}

/// Platform Username (DB row)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PlatformUsername {
    pub id: String,
    pub customer_id: String,
    pub platform_id: String,
    pub username: String,
    pub created_at: i64,
}

/// Platform Username 追加リクエスト
#[derive(Debug, Deserialize)]
pub struct AddUsernameRequest {
    pub platform_id: String,
    pub username: String,
}

// ========================================
// Platform
// ========================================

/// Platform (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Platform {
    pub id: String,
    pub platform: String,
    pub account_type: String,
    pub inventory: i64,
    pub cost_price_cents: i64,
    pub low_stock_alert: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

/// Platform のライフサイクル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformState {
    Active,
    Deleted,
}

impl Platform {
    pub fn state(&self) -> PlatformState {
        match self.deleted_at {
            None => PlatformState::Active,
            Some(_) => PlatformState::Deleted,
        }
    }

    pub fn cost_price(&self) -> Decimal {
        from_cents(self.cost_price_cents)
    }

    pub fn is_low_stock(&self) -> bool {
        self.inventory <= self.low_stock_alert
    }
}

fn default_low_stock_alert() -> i64 { 10 }

/// Platform 作成リクエスト
#[derive(Debug, Deserialize)]
pub struct CreatePlatformRequest {
    pub platform: String,
    pub account_type: String,
    #[serde(default)]
    pub inventory: i64,
    #[serde(default)]
    pub cost_price: Decimal,
    #[serde(default = "default_low_stock_alert")]
    pub low_stock_alert: i64,
}

/// Platform 更新リクエスト（在庫はここでは変更しない）
#[derive(Debug, Deserialize)]
pub struct UpdatePlatformRequest {
    pub platform: Option<String>,
    pub account_type: Option<String>,
    pub cost_price: Option<Decimal>,
    pub low_stock_alert: Option<i64>,
}

/// Platform レスポンス（API返却用）
#[derive(Debug, Serialize)]
pub struct PlatformResponse {
    pub id: String,
    pub platform: String,
    pub account_type: String,
    pub inventory: i64,
    pub cost_price: Decimal,
    pub low_stock_alert: i64,
    pub low_stock: bool,
    pub state: PlatformState,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl PlatformResponse {
    pub fn from_platform(p: &Platform) -> Self {
        Self {
            id: p.id.clone(),
            platform: p.platform.clone(),
            account_type: p.account_type.clone(),
            inventory: p.inventory,
            cost_price: p.cost_price(),
            low_stock_alert: p.low_stock_alert,
            low_stock: p.is_low_stock(),
            state: p.state(),
            created_at: p.created_at,
            updated_at: p.updated_at,
            deleted_at: p.deleted_at,
        }
    }
}

/// Purchase History (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PurchaseRecord {
    pub id: String,
    pub platform_id: String,
    pub quantity: i64,
    pub cost_per_unit_cents: i64,
    pub supplier: Option<String>,
    pub previous_inventory: i64,
    pub new_inventory: i64,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
}

/// 在庫仕入れリクエスト
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub quantity: i64,
    #[serde(default)]
    pub cost_per_unit: Decimal,
    pub supplier: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

/// Purchase History レスポンス
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub id: String,
    pub platform_id: String,
    pub quantity: i64,
    pub cost_per_unit: Decimal,
    pub total_cost: Decimal,
    pub supplier: Option<String>,
    pub previous_inventory: i64,
    pub new_inventory: i64,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
}

impl PurchaseResponse {
    pub fn from_record(r: &PurchaseRecord) -> Self {
        let cost_per_unit = from_cents(r.cost_per_unit_cents);
        Self {
            id: r.id.clone(),
            platform_id: r.platform_id.clone(),
            quantity: r.quantity,
            cost_per_unit,
            total_cost: cost_per_unit * Decimal::from(r.quantity),
            supplier: r.supplier.clone(),
            previous_inventory: r.previous_inventory,
            new_inventory: r.new_inventory,
            notes: r.notes.clone(),
            created_by: r.created_by.clone(),
            created_at: r.created_at,
        }
    }
}

// ========================================
// Pricing Tier
// ========================================

/// Pricing Tier (DB row)
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PricingTier {
    pub id: String,
    pub customer_id: String,
    pub platform_id: String,
    pub min_quantity: i64,
    pub max_quantity: Option<i64>,
    pub unit_price_cents: i64,
    pub is_default: bool,
    pub created_at: i64,
}

impl PricingTier {
    /// min <= quantity <= max（max が NULL なら上限なし）
    pub fn covers(&self, quantity: i64) -> bool {
        quantity >= self.min_quantity && self.max_quantity.map_or(true, |max| quantity <= max)
    }

    /// 範囲の幅。上限なしは None
    pub fn width(&self) -> Option<i64> {
        self.max_quantity.map(|max| max - self.min_quantity)
    }

    pub fn unit_price(&self) -> Decimal {
        from_cents(self.unit_price_cents)
    }
}

fn default_min_quantity() -> i64 { 1 }

/// Pricing Tier 作成リクエスト
#[derive(Debug, Deserialize)]
pub struct CreatePricingTierRequest {
    pub customer_id: String,
    pub platform_id: String,
    #[serde(default = "default_min_quantity")]
    pub min_quantity: i64,
    pub max_quantity: Option<i64>,
    pub unit_price: Decimal,
    #[serde(default)]
    pub is_default: bool,
}

/// Pricing Tier レスポンス
#[derive(Debug, Serialize)]
pub struct PricingTierResponse {
    pub id: String,
    pub customer_id: String,
    pub platform_id: String,
    pub min_quantity: i64,
    pub max_quantity: Option<i64>,
    pub unit_price: Decimal,
    pub is_default: bool,
    pub created_at: i64,
}

impl PricingTierResponse {
    pub fn from_tier(t: &PricingTier) -> Self {
        Self {
            id: t.id.clone(),
            customer_id: t.customer_id.clone(),
            platform_id: t.platform_id.clone(),
            min_quantity: t.min_quantity,
            max_quantity: t.max_quantity,
            unit_price: t.unit_price(),
            is_default: t.is_default,
            created_at: t.created_at,
        }
    }
}

// ========================================
// Order Status
// ========================================

text_enum! {
    /// 注文ステータス
    OrderStatus {
        Pending => "pending",
        Verified => "verified",
        Fulfilled => "fulfilled",
        Cancelled => "cancelled",
        Refunded => "refunded",
    }
}

impl OrderStatus {
    /// 遷移表
    ///
    /// pending → verified | cancelled | refunded
    /// verified → fulfilled | refunded
    /// fulfilled → refunded
    /// cancelled, refunded は終端
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Verified)
                | (Pending, Cancelled)
                | (Verified, Fulfilled)
                | (Pending, Refunded)
                | (Verified, Refunded)
                | (Fulfilled, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// 未納品のまま取消・返金されたら在庫を戻す
    pub fn restocks_on(self, next: OrderStatus) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Verified)
            && matches!(next, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

text_enum! {
    /// コミット手順の進捗
    CommitStatus {
        HeaderSaved => "header_saved",
        ItemsSaved => "items_saved",
        PaymentSaved => "payment_saved",
        Completed => "completed",
        RolledBack => "rolled_back",
    }
}

// ========================================
// Payment Detail
// ========================================

text_enum! {
    PaymentMethod {
        Cash => "Cash",
        Crypto => "Crypto",
        BankTransfer => "Bank Transfer",
    }
}

text_enum! {
    CryptoCurrency {
        Usdt => "USDT",
        Btc => "BTC",
        Usdc => "USDC",
    }
}

text_enum! {
    CryptoNetwork {
        Trc20 => "TRC20",
        Bep20 => "BEP20",
        Bitcoin => "Bitcoin",
    }
}

/// 支払い詳細（payment_method でタグ付け）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payment_method")]
pub enum PaymentDetails {
    Cash {
        cash_received_by: String,
        cash_receipt_number: Option<String>,
        notes: Option<String>,
    },
    Crypto {
        crypto_currency: CryptoCurrency,
        crypto_network: CryptoNetwork,
        crypto_username: Option<String>,
        crypto_wallet_address: Option<String>,
        crypto_transaction_hash: Option<String>,
    },
    #[serde(rename = "Bank Transfer")]
    BankTransfer {
        bank_transaction_reference: String,
        bank_sender_name: String,
        bank_sender_bank: Option<String>,
        bank_transaction_time: Option<DateTime<Utc>>,
        bank_amount_in_currency: Option<Decimal>,
        bank_exchange_rate: Option<Decimal>,
        currency: Option<String>,
    },
}

impl PaymentDetails {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentDetails::Cash { .. } => PaymentMethod::Cash,
            PaymentDetails::Crypto { .. } => PaymentMethod::Crypto,
            PaymentDetails::BankTransfer { .. } => PaymentMethod::BankTransfer,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            PaymentDetails::Cash { cash_received_by, .. } => {
                if cash_received_by.trim().is_empty() {
                    return Err("cash_received_by is required for cash payments".to_string());
                }
            }
            PaymentDetails::Crypto { crypto_currency, crypto_network, .. } => {
                let ok = match crypto_currency {
                    CryptoCurrency::Btc => *crypto_network == CryptoNetwork::Bitcoin,
                    CryptoCurrency::Usdt | CryptoCurrency::Usdc => {
                        *crypto_network != CryptoNetwork::Bitcoin
                    }
                };
                if !ok {
                    return Err(format!(
                        "{} cannot be sent over the {} network",
                        crypto_currency, crypto_network
                    ));
                }
            }
            PaymentDetails::BankTransfer {
                bank_transaction_reference,
                bank_sender_name,
                bank_amount_in_currency,
                bank_exchange_rate,
                ..
            } => {
                if bank_transaction_reference.trim().is_empty() {
                    return Err("bank_transaction_reference is required for bank transfers".to_string());
                }
                if bank_sender_name.trim().is_empty() {
                    return Err("bank_sender_name is required for bank transfers".to_string());
                }
                if bank_amount_in_currency.map_or(false, |a| a.is_sign_negative()) {
                    return Err("bank_amount_in_currency must not be negative".to_string());
                }
                if bank_exchange_rate.map_or(false, |r| r <= Decimal::ZERO) {
                    return Err("bank_exchange_rate must be positive".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Payment Detail (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentDetailRow {
    pub order_id: String,
    pub payment_method: String,
    pub crypto_currency: Option<String>,
    pub crypto_network: Option<String>,
    pub crypto_username: Option<String>,
    pub crypto_wallet_address: Option<String>,
    pub crypto_transaction_hash: Option<String>,
    pub bank_transaction_reference: Option<String>,
    pub bank_sender_name: Option<String>,
    pub bank_sender_bank: Option<String>,
    pub bank_transaction_time: Option<String>,
    pub bank_amount_in_currency: Option<String>,
    pub bank_exchange_rate: Option<String>,
    pub currency: Option<String>,
    pub cash_received_by: Option<String>,
    pub cash_receipt_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: i64,
}

fn required(order_id: &str, column: &str, value: Option<String>) -> Result<String, AppError> {
    value.ok_or_else(|| {
        AppError::Data(format!("payment detail of order {} is missing {}", order_id, column))
    })
}

impl TryFrom<PaymentDetailRow> for PaymentDetails {
    type Error = AppError;

    fn try_from(row: PaymentDetailRow) -> Result<Self, Self::Error> {
        let id = row.order_id.as_str();
        let details = match row.payment_method.parse::<PaymentMethod>()? {
            PaymentMethod::Cash => PaymentDetails::Cash {
                cash_received_by: required(id, "cash_received_by", row.cash_received_by)?,
                cash_receipt_number: row.cash_receipt_number,
                notes: row.notes,
            },
            PaymentMethod::Crypto => PaymentDetails::Crypto {
                crypto_currency: required(id, "crypto_currency", row.crypto_currency)?.parse()?,
                crypto_network: required(id, "crypto_network", row.crypto_network)?.parse()?,
                crypto_username: row.crypto_username,
                crypto_wallet_address: row.crypto_wallet_address,
                crypto_transaction_hash: row.crypto_transaction_hash,
            },
            PaymentMethod::BankTransfer => PaymentDetails::BankTransfer {
                bank_transaction_reference: required(
                    id,
                    "bank_transaction_reference",
                    row.bank_transaction_reference,
                )?,
                bank_sender_name: required(id, "bank_sender_name", row.bank_sender_name)?,
                bank_sender_bank: row.bank_sender_bank,
                bank_transaction_time: row
                    .bank_transaction_time
                    .map(|t| {
                        DateTime::parse_from_rfc3339(&t)
                            .map(|dt| dt.with_timezone(&Utc))
                            .map_err(|e| AppError::Data(format!("bank_transaction_time {}: {}", t, e)))
                    })
                    .transpose()?,
                bank_amount_in_currency: parse_decimal_text(
                    "bank_amount_in_currency",
                    row.bank_amount_in_currency,
                )?,
                bank_exchange_rate: parse_decimal_text("bank_exchange_rate", row.bank_exchange_rate)?,
                currency: row.currency,
            },
        };
        Ok(details)
    }
}

// ========================================
// Order
// ========================================

/// Order (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub customer_id: Option<String>,
    pub payment_method: String,
    pub status: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_amount_cents: i64,
    pub commit_status: String,
    pub commit_error: Option<String>,
    pub draft_json: String,
    pub idempotency_key: Option<String>,
    pub invoice_url: Option<String>,
    pub invoice_sha256: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    pub fn status(&self) -> Result<OrderStatus, AppError> {
        self.status.parse()
    }

    pub fn commit_status(&self) -> Result<CommitStatus, AppError> {
        self.commit_status.parse()
    }
}

/// Order Item (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub platform_id: String,
    pub line_no: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
    pub inventory_applied: bool,
}

/// 注文明細の入力
#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemInput {
    #[serde(default)]
    pub platform_id: String,
    pub quantity: i64,
    /// 省略時は価格ティア → 原価の順で解決
    pub unit_price: Option<Decimal>,
}

/// 注文コミットリクエスト
#[derive(Debug, Clone, Deserialize)]
pub struct CommitOrderRequest {
    pub customer_id: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItemInput>,
    pub payment: PaymentDetails,
    #[serde(default)]
    pub discount_amount: Decimal,
    pub created_by: Option<String>,
    pub idempotency_key: Option<String>,
}

/// 見積もりリクエスト（書き込みなし）
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub customer_id: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItemInput>,
    #[serde(default)]
    pub discount_amount: Decimal,
}

/// ステータス変更リクエスト
#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// 明細修正リクエスト
#[derive(Debug, Deserialize)]
pub struct CorrectOrderItemRequest {
    pub quantity: Option<i64>,
    pub unit_price: Option<Decimal>,
}

/// Order Item レスポンス
#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub platform_id: String,
    pub line_no: i64,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub inventory_applied: bool,
}

impl OrderItemResponse {
    pub fn from_item(i: &OrderItem) -> Self {
        Self {
            id: i.id.clone(),
            platform_id: i.platform_id.clone(),
            line_no: i.line_no,
            quantity: i.quantity,
            unit_price: from_cents(i.unit_price_cents),
            total_price: from_cents(i.total_price_cents),
            inventory_applied: i.inventory_applied,
        }
    }
}

/// Order レスポンス
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub customer_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub commit_status: CommitStatus,
    pub commit_error: Option<String>,
    pub invoice_url: Option<String>,
    pub invoice_sha256: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub items: Vec<OrderItemResponse>,
    pub payment: Option<PaymentDetails>,
}

impl OrderResponse {
    pub fn from_parts(
        order: &Order,
        items: &[OrderItem],
        payment: Option<PaymentDetails>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            id: order.id.clone(),
            order_number: order.order_number.clone(),
            customer_id: order.customer_id.clone(),
            payment_method: order.payment_method.parse()?,
            status: order.status()?,
            subtotal: from_cents(order.subtotal_cents),
            discount_amount: from_cents(order.discount_cents),
            total_amount: from_cents(order.total_amount_cents),
            commit_status: order.commit_status()?,
            commit_error: order.commit_error.clone(),
            invoice_url: order.invoice_url.clone(),
            invoice_sha256: order.invoice_sha256.clone(),
            created_by: order.created_by.clone(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items.iter().map(OrderItemResponse::from_item).collect(),
            payment,
        })
    }
}

/// 見積もりの明細
#[derive(Debug, Serialize)]
pub struct QuoteLine {
    pub line_id: u32,
    pub platform_id: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub price_source: crate::composer::PriceSource,
}

/// 見積もりレスポンス
#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub success: bool,
    pub lines: Vec<QuoteLine>,
    pub totals: Totals,
    pub shortfalls: Vec<crate::composer::Shortfall>,
}

// ========================================
// Employee
// ========================================

text_enum! {
    EmployeeRole {
        Admin => "admin",
        Staff => "staff",
    }
}

/// Employee (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Employee 作成リクエスト
#[derive(Debug, Deserialize)]
pub struct CreateEmployeeRequest {
    pub name: String,
    pub email: String,
    pub role: Option<EmployeeRole>,
}

/// Employee 更新リクエスト
#[derive(Debug, Deserialize)]
pub struct UpdateEmployeeRequest {
    pub name: Option<String>,
    pub role: Option<EmployeeRole>,
    pub active: Option<bool>,
}

/// Employee レスポンス
#[derive(Debug, Serialize)]
pub struct EmployeeResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: EmployeeRole,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EmployeeResponse {
    pub fn from_employee(e: &Employee) -> Result<Self, AppError> {
        Ok(Self {
            id: e.id.clone(),
            name: e.name.clone(),
            email: e.email.clone(),
            role: e.role.parse()?,
            active: e.active,
            created_at: e.created_at,
            updated_at: e.updated_at,
        })
    }
}

// ========================================
// Support Issue
// ========================================

text_enum! {
    IssueStatus {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
}

/// Support Issue (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SupportIssue {
    pub id: String,
    pub ticket: String,
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub subject: String,
    pub description: Option<String>,
    pub status: String,
    pub resolution: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Support Issue 作成リクエスト
#[derive(Debug, Deserialize)]
pub struct CreateIssueRequest {
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub subject: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
}

/// Support Issue 更新リクエスト
#[derive(Debug, Deserialize)]
pub struct UpdateIssueRequest {
    pub status: Option<IssueStatus>,
    pub resolution: Option<String>,
}

/// Support Issue レスポンス
#[derive(Debug, Serialize)]
pub struct IssueResponse {
    pub id: String,
    pub ticket: String,
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub subject: String,
    pub description: Option<String>,
    pub status: IssueStatus,
    pub resolution: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl IssueResponse {
    pub fn from_issue(i: &SupportIssue) -> Result<Self, AppError> {
        Ok(Self {
            id: i.id.clone(),
            ticket: i.ticket.clone(),
            customer_id: i.customer_id.clone(),
            order_id: i.order_id.clone(),
            subject: i.subject.clone(),
            description: i.description.clone(),
            status: i.status.parse()?,
            resolution: i.resolution.clone(),
            created_by: i.created_by.clone(),
            created_at: i.created_at,
            updated_at: i.updated_at,
        })
    }
}
