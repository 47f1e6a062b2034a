//! Hybrid 5-minute strategy.
//!
//! Scans a fixed commodity list, keeps items whose instant spread clears a
//! per-item profit target, and asks the scoring oracle to confirm each one
//! against the last four 5-minute buckets.

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{fan_out, BuyPricePolicy, Candidate, DecisionContext, FlipStrategy, StrategyKind};
use crate::market::{indicators, TimeseriesCache};
use crate::scoring::{Features, ScoringOracle};
use crate::types::{FlipperError, Granularity, ItemId};

const DEFAULT_TARGETS: [ItemId; 90] = [
    2, 231, 199, 201, 203, 205, 207, 209, 211, 213, 215, 217, 219, 2485, 3049, 3051, 11230, 6685,
    2434, 169, 3040, 383, 227, 453, 235, 1777, 13439, 11934, 560, 565, 555, 554, 557, 556, 9075,
    8839, 8840, 2353, 2363, 2361, 2359, 2351, 2349, 11212, 11235, 4585, 12934, 13357, 13441, 11936,
    19912, 19948, 19960, 19972, 19984, 20002, 20014, 20026, 20038, 20050, 20062, 20074, 20086,
    20098, 20849, 20904, 21880, 22296, 22826, 23583, 23595, 23607, 23619, 23631, 24538, 26233,
    26245, 26257, 26269, 26281, 26293, 26305, 27158, 562, 563, 561, 811, 221, 223, 225,
];

const DEFAULT_PROFIT_TARGETS: [(ItemId, i64); 51] = [
    (561, 3), (2, 6), (231, 4), (199, 5), (201, 5), (203, 5), (205, 7), (207, 6), (209, 8),
    (211, 6), (213, 7), (215, 8), (217, 8), (219, 9), (2485, 50), (3049, 21), (3051, 16),
    (11230, 133), (6685, 86), (2434, 13), (169, 7), (3040, 48), (383, 10), (227, 4), (453, 2),
    (235, 3), (1777, 6), (13439, 5), (11934, 5), (560, 2), (565, 2), (555, 1), (554, 1), (557, 1),
    (556, 1), (9075, 2), (8839, 30), (8840, 20), (2353, 5), (2363, 15), (2361, 10), (2359, 8),
    (2351, 5), (2349, 4), (11212, 100), (11235, 150), (4585, 30), (12934, 500), (13357, 5),
    (13441, 10), (11936, 10),
];

/// Minimum after-tax profit for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ProfitTarget {
    pub item_id: ItemId,
    pub min_profit: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub target_commodities: Vec<ItemId>,
    pub profit_targets: Vec<ProfitTarget>,
    /// Target for commodities without an explicit entry.
    pub default_min_profit: i64,
    /// Volume of the most recent 5-minute bucket.
    pub min_bucket_volume: i64,
    pub history_points: usize,
    /// Candidates need strictly more than this.
    pub min_confidence: f64,
    pub trade_duration_hours: f64,
    pub min_cash_per_slot: i64,
    pub stall_after_mins: i64,
    pub buy_price: BuyPricePolicy,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            target_commodities: DEFAULT_TARGETS.to_vec(),
            profit_targets: DEFAULT_PROFIT_TARGETS
                .iter()
                .map(|&(item_id, min_profit)| ProfitTarget { item_id, min_profit })
                .collect(),
            default_min_profit: 1,
            min_bucket_volume: 2500,
            history_points: 4,
            min_confidence: 0.60,
            trade_duration_hours: 0.15,
            min_cash_per_slot: 10_000,
            stall_after_mins: 10,
            buy_price: BuyPricePolicy::InstantSell,
        }
    }
}

pub struct HybridStrategy {
    cfg: HybridConfig,
    targets: HashMap<ItemId, i64>,
    timeseries: Arc<TimeseriesCache>,
    oracle: Arc<dyn ScoringOracle>,
}

impl HybridStrategy {
    pub fn new(cfg: HybridConfig, timeseries: Arc<TimeseriesCache>, oracle: Arc<dyn ScoringOracle>) -> Self {
        let targets = cfg
            .profit_targets
            .iter()
            .map(|t| (t.item_id, t.min_profit))
            .collect();
        Self {
            cfg,
            targets,
            timeseries,
            oracle,
        }
    }

    fn min_profit(&self, item_id: ItemId) -> i64 {
        self.targets
            .get(&item_id)
            .copied()
            .unwrap_or(self.cfg.default_min_profit)
    }

    async fn evaluate(&self, ctx: &DecisionContext<'_>, item_id: ItemId) -> Result<Option<Candidate>, FlipperError> {
        let Some(m) = ctx.metrics(item_id) else {
            return Ok(None);
        };
        if m.profit < self.min_profit(item_id) || m.low > ctx.cash_per_slot || m.quantity <= 0 {
            return Ok(None);
        }

        let series = self.timeseries.get(item_id, Granularity::FiveMinutes).await?;
        if series.len() < self.cfg.history_points {
            return Err(FlipperError::PartialCandidate {
                item_id,
                message: format!("only {} timeseries points", series.len()),
            });
        }
        let recent = &series[series.len() - self.cfg.history_points..];
        let volume = indicators::last_volume(recent);
        if volume < self.cfg.min_bucket_volume {
            return Ok(None);
        }

        let price = self.cfg.buy_price.price(m.low);
        let prices = indicators::mid_prices(recent);
        let features = Features {
            buy_price: price,
            quantity: m.quantity,
            trade_duration_hours: self.cfg.trade_duration_hours,
            buy_day_of_week: 0,
            buy_hour_of_day: 0,
            strategy_5m: 1,
            strategy_8h: 0,
            volatility: indicators::std_dev(&prices),
            momentum: indicators::momentum(&prices),
            ma_price_ratio: indicators::ma_ratio(price as f64, &prices),
        }
        .at(ctx.now);

        let confidence = self.oracle.predict(&features).await?;
        debug!(item_id, confidence, profit = m.profit, volume, "Hybrid candidate scored");
        if confidence <= self.cfg.min_confidence {
            return Ok(None);
        }

        Ok(Some(Candidate {
            price,
            quantity: m.quantity,
            score: confidence,
            tiebreak: m.profit as f64,
            confidence: Some(confidence),
            predicted_sell_price: Some(m.high),
            message: format!("AI confidence (5m): {}%", (confidence * 100.0).round()),
            metrics: m,
        }))
    }
}

#[async_trait]
impl FlipStrategy for HybridStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }

    fn stall_after(&self) -> Duration {
        Duration::minutes(self.cfg.stall_after_mins)
    }

    fn min_cash_per_slot(&self) -> i64 {
        self.cfg.min_cash_per_slot
    }

    async fn candidates(&self, ctx: &DecisionContext<'_>) -> Vec<Candidate> {
        fan_out(self.cfg.target_commodities.clone(), |id| self.evaluate(ctx, id)).await
    }
}
