//! Volume-weighted spread strategy: favours items that both clear a profit
//! after tax and trade heavily, scoring `profit × log10(volume)`.

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;

use super::{BuyPricePolicy, Candidate, DecisionContext, FlipStrategy, StrategyKind};
use crate::types::ItemId;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VolumeSpreadConfig {
    pub min_profit: i64,
    /// Instant-buy volume over the reporting window.
    pub min_volume: i64,
    pub members_only: bool,
    pub min_cash_per_slot: i64,
    pub stall_after_mins: i64,
    pub buy_price: BuyPricePolicy,
}

impl Default for VolumeSpreadConfig {
    fn default() -> Self {
        Self {
            min_profit: 1,
            min_volume: 100,
            members_only: true,
            min_cash_per_slot: 50_000,
            stall_after_mins: 30,
            buy_price: BuyPricePolicy::InstantSell,
        }
    }
}

pub struct VolumeSpreadStrategy {
    cfg: VolumeSpreadConfig,
}

impl VolumeSpreadStrategy {
    pub fn new(cfg: VolumeSpreadConfig) -> Self {
        Self { cfg }
    }

    fn evaluate(&self, ctx: &DecisionContext<'_>, item_id: ItemId) -> Option<Candidate> {
        let mapping = ctx.snapshot.item(item_id)?;
        if self.cfg.members_only && !mapping.members {
            return None;
        }
        let volume = ctx.snapshot.price(item_id)?.high_volume.unwrap_or(0);
        if volume < self.cfg.min_volume {
            return None;
        }

        let m = ctx.metrics(item_id)?;
        if m.profit < self.cfg.min_profit || m.quantity <= 0 {
            return None;
        }

        let score = m.profit as f64 * (volume as f64).log10();
        Some(Candidate {
            price: self.cfg.buy_price.price(m.low),
            quantity: m.quantity,
            score,
            tiebreak: volume as f64,
            confidence: None,
            predicted_sell_price: Some(m.high),
            message: format!("Volume spread: {} (score {score:.2})", m.name),
            metrics: m,
        })
    }
}

#[async_trait]
impl FlipStrategy for VolumeSpreadStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::VolumeSpread
    }

    fn stall_after(&self) -> Duration {
        Duration::minutes(self.cfg.stall_after_mins)
    }

    fn min_cash_per_slot(&self) -> i64 {
        self.cfg.min_cash_per_slot
    }

    async fn candidates(&self, ctx: &DecisionContext<'_>) -> Vec<Candidate> {
        ctx.snapshot
            .latest
            .keys()
            .filter_map(|&id| self.evaluate(ctx, id))
            .collect()
    }
}
