//! Flip scoring.
//!
//! Defines the `ScoringOracle` trait (feature vector → confidence that a
//! flip is profitable) and provides two backends:
//! - `TreeEnsemble`: in-process evaluator for a gradient-boosted tree dump
//! - `RemoteOracle`: HTTP client for a hosted prediction endpoint

pub mod ensemble;
pub mod remote;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::{AppConfig, ScoringBackend, ScoringConfig};
use crate::types::FlipperError;

pub use ensemble::TreeEnsemble;
pub use remote::RemoteOracle;

/// Names of every feature, in the order the models were trained on.
pub const FEATURE_NAMES: [&str; 10] = [
    "buy_price",
    "quantity",
    "trade_duration_hours",
    "buy_day_of_week",
    "buy_hour_of_day",
    "strategy_5m",
    "strategy_8h",
    "volatility",
    "momentum",
    "ma_price_ratio",
];

/// Inputs to a confidence prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub buy_price: i64,
    pub quantity: i64,
    pub trade_duration_hours: f64,
    /// 0 = Sunday.
    pub buy_day_of_week: u32,
    pub buy_hour_of_day: u32,
    pub strategy_5m: u8,
    pub strategy_8h: u8,
    pub volatility: f64,
    pub momentum: f64,
    pub ma_price_ratio: f64,
}

impl Features {
    /// Fill in the day-of-week and hour (UTC) from a timestamp.
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.buy_day_of_week = time.weekday().num_days_from_sunday();
        self.buy_hour_of_day = time.hour();
        self
    }

    /// Value of a named feature.
    pub fn value(&self, name: &str) -> Option<f64> {
        Some(match name {
            "buy_price" => self.buy_price as f64,
            "quantity" => self.quantity as f64,
            "trade_duration_hours" => self.trade_duration_hours,
            "buy_day_of_week" => self.buy_day_of_week as f64,
            "buy_hour_of_day" => self.buy_hour_of_day as f64,
            "strategy_5m" => self.strategy_5m as f64,
            "strategy_8h" => self.strategy_8h as f64,
            "volatility" => self.volatility,
            "momentum" => self.momentum,
            "ma_price_ratio" => self.ma_price_ratio,
            _ => return None,
        })
    }

    pub fn validate(&self) -> Result<(), FlipperError> {
        let invalid = |msg: String| Err(FlipperError::InvalidInput(msg));
        if self.buy_price <= 0 {
            return invalid(format!("buy_price must be positive, got {}", self.buy_price));
        }
        if self.quantity <= 0 {
            return invalid(format!("quantity must be positive, got {}", self.quantity));
        }
        if self.buy_day_of_week > 6 {
            return invalid(format!("buy_day_of_week out of range: {}", self.buy_day_of_week));
        }
        if self.buy_hour_of_day > 23 {
            return invalid(format!("buy_hour_of_day out of range: {}", self.buy_hour_of_day));
        }
        for name in FEATURE_NAMES {
            if let Some(v) = self.value(name) {
                if !v.is_finite() {
                    return invalid(format!("{name} is not finite"));
                }
            }
        }
        Ok(())
    }
}

/// Probability that a candidate flip is profitable.
///
/// Implementations must return a value in `[0, 1]` or an error; the engine
/// excludes a candidate whose prediction fails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn predict(&self, features: &Features) -> Result<f64, FlipperError>;
}

/// Build the configured scoring backend.
pub fn build_oracle(cfg: &ScoringConfig) -> Result<Arc<dyn ScoringOracle>> {
    match cfg.backend {
        ScoringBackend::Ensemble => {
            let model = TreeEnsemble::from_file(&cfg.model_path)?;
            info!(path = %cfg.model_path, trees = model.tree_count(), "Loaded tree ensemble");
            Ok(Arc::new(model))
        }
        ScoringBackend::Remote => {
            let endpoint = cfg
                .endpoint
                .clone()
                .context("scoring.endpoint is required for the remote backend")?;
            let api_key = cfg
                .api_key_env
                .as_deref()
                .map(AppConfig::resolve_env)
                .transpose()?;
            info!(endpoint = %endpoint, "Using remote scoring endpoint");
            Ok(Arc::new(RemoteOracle::new(endpoint, api_key, cfg.timeout_secs)?))
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_features() -> Features {
    Features {
        buy_price: 100,
        quantity: 50,
        trade_duration_hours: 0.15,
        buy_day_of_week: 3,
        buy_hour_of_day: 14,
        strategy_5m: 1,
        strategy_8h: 0,
        volatility: 1.5,
        momentum: 0.01,
        ma_price_ratio: 0.98,
    }
}
