//! Price Resolver
//!
//! (customer, platform, quantity) → 単価。該当ティアが無ければ `NoTier`。
//! 範囲が重なる場合は次の順で決定する:
//! 1. 範囲が狭いもの（上限なしは最も広い）
//! 2. min_quantity が大きいもの
//! 3. created_at が古いもの
//! 4. id の辞書順

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::composer::PriceSource;
use crate::db::DbPool;
use crate::models::{Platform, PricingTier};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum PriceResolution {
    Tier { tier_id: String, unit_price: Decimal },
    NoTier,
}

impl PriceResolution {
    pub fn unit_price(&self) -> Option<Decimal> {
        match self {
            PriceResolution::Tier { unit_price, .. } => Some(*unit_price),
            PriceResolution::NoTier => None,
        }
    }
}

fn tie_break(a: &PricingTier, b: &PricingTier) -> Ordering {
    let width = match (a.width(), b.width()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    width
        .then_with(|| b.min_quantity.cmp(&a.min_quantity))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// 数量を含むティアのうち優先度が最も高いもの
pub fn select_tier(tiers: &[PricingTier], quantity: i64) -> Option<&PricingTier> {
    tiers
        .iter()
        .filter(|t| t.covers(quantity))
        .min_by(|a, b| tie_break(a, b))
}

pub async fn load_tiers(
    db: &DbPool,
    customer_id: &str,
    platform_id: &str,
) -> Result<Vec<PricingTier>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM pricing_tiers WHERE customer_id = ? AND platform_id = ?"
    )
    .bind(customer_id)
    .bind(platform_id)
    .fetch_all(db)
    .await
}

pub async fn resolve_price(
    db: &DbPool,
    customer_id: &str,
    platform_id: &str,
    quantity: i64,
) -> Result<PriceResolution, sqlx::Error> {
    let tiers = load_tiers(db, customer_id, platform_id).await?;
    let resolution = match select_tier(&tiers, quantity) {
        Some(tier) => PriceResolution::Tier {
            tier_id: tier.id.clone(),
            unit_price: tier.unit_price(),
        },
        None => PriceResolution::NoTier,
    };
    debug!(
        "Resolved price: customer={}, platform={}, qty={}, {:?}",
        customer_id, platform_id, quantity, resolution
    );
    Ok(resolution)
}

/// 明細の単価を決める。入力があればそれ、無ければティア、それも無ければ原価
pub async fn price_item(
    db: &DbPool,
    customer_id: Option<&str>,
    platform: &Platform,
    quantity: i64,
    explicit: Option<Decimal>,
) -> Result<(Decimal, PriceSource), sqlx::Error> {
    if let Some(price) = explicit {
        return Ok((price, PriceSource::Manual));
    }
    if let Some(customer_id) = customer_id {
        if let Some(price) = resolve_price(db, customer_id, &platform.id, quantity)
            .await?
            .unit_price()
        {
            return Ok((price, PriceSource::Tier));
        }
    }
    Ok((platform.cost_price(), PriceSource::BaseCost))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(id: &str, min: i64, max: Option<i64>, cents: i64, created_at: i64) -> PricingTier {
        PricingTier {
            id: id.to_string(),
            customer_id: "acme".to_string(),
            platform_id: "gold".to_string(),
            min_quantity: min,
            max_quantity: max,
            unit_price_cents: cents,
            is_default: false,
            created_at,
        }
    }

    #[test]
    fn boundary_between_adjacent_tiers() {
        let tiers = vec![tier("a", 1, Some(10), 500, 1), tier("b", 11, None, 400, 2)];
        assert_eq!(select_tier(&tiers, 10).map(|t| t.unit_price_cents), Some(500));
        assert_eq!(select_tier(&tiers, 11).map(|t| t.unit_price_cents), Some(400));
        assert_eq!(select_tier(&tiers, 1).map(|t| t.unit_price_cents), Some(500));
    }

    #[test]
    fn no_tiers_means_no_match() {
        assert!(select_tier(&[], 5).is_none());
        let tiers = vec![tier("a", 10, Some(20), 500, 1)];
        assert!(select_tier(&tiers, 5).is_none());
        assert!(select_tier(&tiers, 21).is_none());
    }

    #[test]
    fn non_positive_quantity_never_matches() {
        let tiers = vec![tier("a", 1, None, 500, 1)];
        assert!(select_tier(&tiers, 0).is_none());
        assert!(select_tier(&tiers, -3).is_none());
    }

    #[test]
    fn narrowest_overlapping_range_wins() {
        let wide = tier("wide", 1, Some(20), 500, 1);
        let narrow = tier("narrow", 5, Some(15), 300, 2);
        // 取得順に依存しない
        let forward = vec![wide.clone(), narrow.clone()];
        let backward = vec![narrow, wide];
        assert_eq!(select_tier(&forward, 10).map(|t| t.id.as_str()), Some("narrow"));
        assert_eq!(select_tier(&backward, 10).map(|t| t.id.as_str()), Some("narrow"));
        // 狭い方の範囲外では広い方
        assert_eq!(select_tier(&forward, 3).map(|t| t.id.as_str()), Some("wide"));
    }

    #[test]
    fn bounded_beats_unbounded() {
        let tiers = vec![tier("open", 1, None, 100, 1), tier("capped", 1, Some(1000), 200, 2)];
        assert_eq!(select_tier(&tiers, 50).map(|t| t.id.as_str()), Some("capped"));
        assert_eq!(select_tier(&tiers, 1001).map(|t| t.id.as_str()), Some("open"));
    }

    #[test]
    fn equal_width_prefers_higher_min_then_oldest() {
        let tiers = vec![
            tier("low", 1, Some(10), 100, 1),
            tier("high", 5, Some(14), 200, 2),
        ];
        assert_eq!(select_tier(&tiers, 7).map(|t| t.id.as_str()), Some("high"));

        let tiers = vec![
            tier("newer", 1, Some(10), 100, 20),
            tier("older", 1, Some(10), 200, 10),
        ];
        assert_eq!(select_tier(&tiers, 7).map(|t| t.id.as_str()), Some("older"));

        let tiers = vec![tier("b", 1, Some(10), 100, 5), tier("a", 1, Some(10), 200, 5)];
        assert_eq!(select_tier(&tiers, 7).map(|t| t.id.as_str()), Some("a"));
    }
}
