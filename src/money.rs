//! Money Helpers
//! DB は整数セント、API は Decimal

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Error, PartialEq)]
#[error("amount out of range: {0}")]
pub struct AmountOutOfRange(pub Decimal);

/// Decimal → セント（小数第3位で四捨五入）
pub fn to_cents(amount: Decimal) -> Result<i64, AmountOutOfRange> {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    i64::try_from(rounded.mantissa()).map_err(|_| AmountOutOfRange(amount))
}

/// セント → Decimal
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// 数量 × 単価。Decimal の範囲を超えたらエラー
pub fn line_total(quantity: i64, unit_price: Decimal) -> Result<Decimal, AmountOutOfRange> {
    Decimal::from(quantity)
        .checked_mul(unit_price)
        .ok_or(AmountOutOfRange(unit_price))
}

/// 為替レート等の精度を保つ TEXT カラム用
pub fn parse_decimal_text(column: &str, raw: Option<String>) -> Result<Option<Decimal>, AppError> {
    raw.map(|s| {
        s.parse::<Decimal>()
            .map_err(|e| AppError::Data(format!("{} is not a decimal ({}): {}", column, s, e)))
    })
    .transpose()
}

impl From<AmountOutOfRange> for AppError {
    fn from(e: AmountOutOfRange) -> Self {
        AppError::Validation(e.to_string())
    }
}
