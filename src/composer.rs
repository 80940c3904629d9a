//! Order Composer
//!
//! 注文の下書き。明細の追加・削除と合計計算のみを行い、
//! DB には触れない。同じプラットフォームの明細は統合せず別行のまま持つ。

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::{line_total, to_cents, AmountOutOfRange};

/// 単価の出どころ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// 顧客別の価格ティア
    Tier,
    /// ティアなし → プラットフォーム原価
    BaseCost,
    /// 入力された単価
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLine {
    pub line_id: u32,
    pub platform_id: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub price_source: PriceSource,
}

impl DraftLine {
    pub fn total(&self) -> Result<Decimal, AmountOutOfRange> {
        line_total(self.quantity, self.unit_price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub subtotal: Decimal,
    /// 実際に適用された値引き（小計で頭打ち）
    pub discount: Decimal,
    pub final_total: Decimal,
}

/// 在庫不足
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortfall {
    pub platform_id: String,
    pub requested: i64,
    pub available: i64,
}

#[derive(Debug, Error, PartialEq)]
pub enum ComposerError {
    #[error("discount must not be negative: {0}")]
    NegativeDiscount(Decimal),
    #[error(transparent)]
    OutOfRange(#[from] AmountOutOfRange),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    lines: Vec<DraftLine>,
    discount: Decimal,
    next_line_id: u32,
}

impl OrderDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// 明細を追加して行 ID を返す。
    /// 行合計・小計がセントの整数で表せない場合は追加しない
    pub fn add_item(
        &mut self,
        platform_id: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
        price_source: PriceSource,
    ) -> Result<u32, ComposerError> {
        let line_id = self.next_line_id;
        let line = DraftLine {
            line_id,
            platform_id: platform_id.into(),
            quantity,
            unit_price,
            price_source,
        };
        let total = line.total()?;
        to_cents(total)?;
        let subtotal = self.subtotal()?;
        to_cents(subtotal.checked_add(total).ok_or(AmountOutOfRange(total))?)?;

        self.next_line_id += 1;
        self.lines.push(line);
        Ok(line_id)
    }

    pub fn remove_item(&mut self, line_id: u32) -> Option<DraftLine> {
        let pos = self.lines.iter().position(|l| l.line_id == line_id)?;
        Some(self.lines.remove(pos))
    }

    pub fn lines(&self) -> &[DraftLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn set_discount(&mut self, discount: Decimal) -> Result<(), ComposerError> {
        if discount.is_sign_negative() && !discount.is_zero() {
            return Err(ComposerError::NegativeDiscount(discount));
        }
        self.discount = discount;
        Ok(())
    }

    /// 入力された値引き（頭打ち前）
    pub fn requested_discount(&self) -> Decimal {
        self.discount
    }

    fn subtotal(&self) -> Result<Decimal, AmountOutOfRange> {
        self.lines.iter().try_fold(Decimal::ZERO, |acc, line| {
            let total = line.total()?;
            acc.checked_add(total).ok_or(AmountOutOfRange(total))
        })
    }

    pub fn compute_totals(&self) -> Result<Totals, ComposerError> {
        let subtotal = self.subtotal()?;
        let discount = self.discount.max(Decimal::ZERO).min(subtotal);
        Ok(Totals {
            subtotal,
            discount,
            final_total: subtotal - discount,
        })
    }

    /// プラットフォームごとの合計数量（i64 で頭打ち）
    pub fn quantity_by_platform(&self) -> BTreeMap<&str, i64> {
        let mut totals = BTreeMap::new();
        for line in &self.lines {
            let sum = totals.entry(line.platform_id.as_str()).or_insert(0i64);
            *sum = sum.saturating_add(line.quantity);
        }
        totals
    }

    /// 在庫スナップショットに対する不足分
    pub fn inventory_shortfalls(&self, available: &HashMap<String, i64>) -> Vec<Shortfall> {
        self.quantity_by_platform()
            .into_iter()
            .filter_map(|(platform_id, requested)| {
                let available = available.get(platform_id).copied().unwrap_or(0);
                (requested > available).then(|| Shortfall {
                    platform_id: platform_id.to_string(),
                    requested,
                    available,
                })
            })
            .collect()
    }
}
