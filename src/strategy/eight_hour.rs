//! Eight-hour strategy.
//!
//! Pre-filters the whole mapping down to the widest spreads, then lets the
//! scoring oracle pick a quantity and predict where the item will sell
//! within eight hours. Only flips whose predicted profit clears both an
//! absolute and a relative floor survive.

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use std::cmp::Ordering;
use tracing::debug;
use std::sync::Arc;

use super::{fan_out, BuyPricePolicy, Candidate, CandidateMetrics, DecisionContext, FlipStrategy, StrategyKind};
use crate::market::{indicators, TimeseriesCache};
use crate::scoring::{Features, ScoringOracle};
use crate::types::{FlipperError, Granularity, ItemId};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EightHourConfig {
    pub min_spread: i64,
    pub min_price: i64,
    pub max_price: i64,
    /// How many of the widest spreads get scored.
    pub shortlist: usize,
    /// 5-minute buckets fed to the indicators (24 = two hours).
    pub history_points: usize,
    /// Quantity caps tried per item; the best-scoring one wins.
    pub quantity_caps: Vec<i64>,
    pub min_confidence: f64,
    pub min_profit_gp: i64,
    pub min_profit_pct: f64,
    pub trade_duration_hours: f64,
    pub min_cash_per_slot: i64,
    pub stall_after_mins: i64,
    pub buy_price: BuyPricePolicy,
}

impl Default for EightHourConfig {
    fn default() -> Self {
        Self {
            min_spread: 2,
            min_price: 5,
            max_price: 50_000_000,
            shortlist: 20,
            history_points: 24,
            quantity_caps: vec![50, 10],
            min_confidence: 0.65,
            min_profit_gp: 10,
            min_profit_pct: 0.05,
            trade_duration_hours: 8.0,
            min_cash_per_slot: 1_000,
            stall_after_mins: 60,
            buy_price: BuyPricePolicy::InstantSell,
        }
    }
}

/// Outcome of one quantity trial.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Trial {
    quantity: i64,
    confidence: f64,
    predicted_sell: i64,
    profit: i64,
    profit_pct: f64,
    score: f64,
}

/// Sell price the oracle's confidence implies: the instant-buy price
/// stretched by the relative spread, scaled by how far confidence sits
/// above a coin flip.
pub fn predicted_sell_price(high: i64, low: i64, confidence: f64) -> i64 {
    let spread_ratio = (high - low) as f64 / low as f64;
    (high as f64 * (1.0 + (confidence - 0.5) * spread_ratio)).floor() as i64
}

pub struct EightHourStrategy {
    cfg: EightHourConfig,
    timeseries: Arc<TimeseriesCache>,
    oracle: Arc<dyn ScoringOracle>,
}

impl EightHourStrategy {
    pub fn new(cfg: EightHourConfig, timeseries: Arc<TimeseriesCache>, oracle: Arc<dyn ScoringOracle>) -> Self {
        Self {
            cfg,
            timeseries,
            oracle,
        }
    }

    fn passes_prefilter(&self, m: &CandidateMetrics) -> bool {
        m.margin >= self.cfg.min_spread
            && m.low >= self.cfg.min_price
            && m.high <= self.cfg.max_price
            && m.remaining_limit > 0
    }

    /// Widest spreads first, lower item id on ties.
    fn shortlist(&self, ctx: &DecisionContext<'_>) -> Vec<ItemId> {
        let mut eligible: Vec<CandidateMetrics> = ctx
            .snapshot
            .mapping
            .values()
            .filter(|item| item.buy_limit() > 0)
            .filter_map(|item| ctx.metrics(item.id))
            .filter(|m| self.passes_prefilter(m))
            .collect();

        eligible.sort_by(|a, b| match b.margin.cmp(&a.margin) {
            Ordering::Equal => a.item_id.cmp(&b.item_id),
            other => other,
        });
        eligible.truncate(self.cfg.shortlist);
        eligible.into_iter().map(|m| m.item_id).collect()
    }

    fn quantities(&self, max: i64) -> Vec<i64> {
        let mut qs: Vec<i64> = self
            .cfg
            .quantity_caps
            .iter()
            .map(|&cap| max.min(cap))
            .filter(|&q| q > 0)
            .collect();
        qs.dedup();
        qs
    }

    async fn evaluate(&self, ctx: &DecisionContext<'_>, item_id: ItemId) -> Result<Option<Candidate>, FlipperError> {
        let Some(m) = ctx.metrics(item_id) else {
            return Ok(None);
        };
        if m.quantity <= 0 {
            return Ok(None);
        }

        let series = self.timeseries.get(item_id, Granularity::FiveMinutes).await?;
        if series.is_empty() {
            return Err(FlipperError::PartialCandidate {
                item_id,
                message: "empty timeseries".into(),
            });
        }
        let recent = &series[series.len().saturating_sub(self.cfg.history_points)..];
        let prices = indicators::mid_prices(recent);
        let current = recent
            .last()
            .and_then(|p| p.mid_price())
            .unwrap_or(((m.high + m.low) / 2) as f64);

        let price = self.cfg.buy_price.price(m.low);
        let base = Features {
            buy_price: price,
            quantity: 1,
            trade_duration_hours: self.cfg.trade_duration_hours,
            buy_day_of_week: 0,
            buy_hour_of_day: 0,
            strategy_5m: 0,
            strategy_8h: 1,
            volatility: indicators::rms_returns(&prices),
            momentum: indicators::momentum(&prices),
            ma_price_ratio: indicators::ma_ratio(current, &prices),
        }
        .at(ctx.now);

        let mut best: Option<Trial> = None;
        for quantity in self.quantities(m.quantity) {
            let confidence = self.oracle.predict(&Features { quantity, ..base }).await?;
            if confidence <= self.cfg.min_confidence {
                continue;
            }

            let predicted_sell = predicted_sell_price(m.high, m.low, confidence);
            let cost = price * quantity;
            let net = predicted_sell * quantity - ctx.tax.tax(item_id, predicted_sell, quantity);
            let profit = net - cost;
            let profit_pct = profit as f64 / cost as f64;
            if profit < self.cfg.min_profit_gp || profit_pct < self.cfg.min_profit_pct {
                continue;
            }

            let score = confidence * profit_pct * quantity as f64;
            if best.map_or(true, |b| score > b.score) {
                best = Some(Trial {
                    quantity,
                    confidence,
                    predicted_sell,
                    profit,
                    profit_pct,
                    score,
                });
            }
        }

        let Some(trial) = best else {
            return Ok(None);
        };
        debug!(
            item_id,
            quantity = trial.quantity,
            confidence = trial.confidence,
            predicted_sell = trial.predicted_sell,
            profit = trial.profit,
            "8h candidate scored"
        );

        Ok(Some(Candidate {
            price,
            quantity: trial.quantity,
            score: trial.score,
            tiebreak: trial.profit as f64,
            confidence: Some(trial.confidence),
            predicted_sell_price: Some(trial.predicted_sell),
            message: format!(
                "8h AI: sell at {} for {}gp ({:.1}%), confidence {:.0}%",
                trial.predicted_sell,
                trial.profit,
                trial.profit_pct * 100.0,
                trial.confidence * 100.0
            ),
            metrics: m,
        }))
    }
}

#[async_trait]
impl FlipStrategy for EightHourStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::EightHour
    }

    fn stall_after(&self) -> Duration {
        Duration::minutes(self.cfg.stall_after_mins)
    }

    fn min_cash_per_slot(&self) -> i64 {
        self.cfg.min_cash_per_slot
    }

    async fn candidates(&self, ctx: &DecisionContext<'_>) -> Vec<Candidate> {
        let shortlist = self.shortlist(ctx);
        debug!(shortlisted = shortlist.len(), "8h shortlist built");
        fan_out(shortlist, |id| self.evaluate(ctx, id)).await
    }
}
