//! Active spread strategy: pure instant-spread arbitrage, no oracle.
//! Bids one coin over the instant-sell price to get filled first.

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;

use super::{BuyPricePolicy, Candidate, DecisionContext, FlipStrategy, StrategyKind};
use crate::types::ItemId;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActiveSpreadConfig {
    /// Items to scan. Empty scans the whole mapping.
    pub items: Vec<ItemId>,
    pub min_profit: i64,
    pub min_roi: f64,
    pub min_cash_per_slot: i64,
    pub stall_after_mins: i64,
    pub buy_price: BuyPricePolicy,
}

impl Default for ActiveSpreadConfig {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            min_profit: 1,
            min_roi: 0.0,
            min_cash_per_slot: 1_000,
            stall_after_mins: 15,
            buy_price: BuyPricePolicy::Overbid,
        }
    }
}

pub struct ActiveSpreadStrategy {
    cfg: ActiveSpreadConfig,
}

impl ActiveSpreadStrategy {
    pub fn new(cfg: ActiveSpreadConfig) -> Self {
        Self { cfg }
    }

    fn universe(&self, ctx: &DecisionContext<'_>) -> Vec<ItemId> {
        if self.cfg.items.is_empty() {
            ctx.snapshot.mapping.keys().copied().collect()
        } else {
            self.cfg.items.clone()
        }
    }

    fn evaluate(&self, ctx: &DecisionContext<'_>, item_id: ItemId) -> Option<Candidate> {
        let m = ctx.metrics(item_id)?;
        if m.margin <= 0 || m.profit < self.cfg.min_profit || m.roi < self.cfg.min_roi || m.quantity <= 0 {
            return None;
        }

        Some(Candidate {
            price: self.cfg.buy_price.price(m.low),
            quantity: m.quantity,
            score: (m.profit * m.quantity) as f64,
            tiebreak: m.roi,
            confidence: None,
            predicted_sell_price: Some(m.high),
            message: format!("Active spread: {} ({}gp each after tax)", m.name, m.profit),
            metrics: m,
        })
    }
}

#[async_trait]
impl FlipStrategy for ActiveSpreadStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ActiveSpread
    }

    fn stall_after(&self) -> Duration {
        Duration::minutes(self.cfg.stall_after_mins)
    }

    fn min_cash_per_slot(&self) -> i64 {
        self.cfg.min_cash_per_slot
    }

    async fn candidates(&self, ctx: &DecisionContext<'_>) -> Vec<Candidate> {
        self.universe(ctx)
            .into_iter()
            .filter_map(|id| self.evaluate(ctx, id))
            .collect()
    }
}
