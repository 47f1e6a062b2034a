//! Mock price source for integration testing.
//!
//! Provides a deterministic `PriceSource` implementation serving known
//! items, prices and timeseries, all in-memory with no network access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use flipper::market::PriceSource;
use flipper::scoring::{Features, ScoringOracle};
use flipper::types::*;

/// A mock price API for deterministic testing.
///
/// Items, prices and series are fully controllable from test code.
#[derive(Default)]
pub struct MockSource {
    mapping: Mutex<Vec<ItemMapping>>,
    latest: Mutex<HashMap<ItemId, LatestPrice>>,
    series: Mutex<HashMap<ItemId, Vec<TimeseriesPoint>>>,
    /// If set, every fetch fails with this message.
    force_error: Arc<Mutex<Option<String>>>,
    pub fetches: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single-item market used by most scenarios.
    pub fn rune_market() -> Self {
        let source = Self::new();
        source.add_item(100, "Rune", 1000, 110, 100);
        source
    }

    pub fn add_item(&self, id: ItemId, name: &str, limit: i64, high: i64, low: i64) {
        self.mapping.lock().unwrap().push(ItemMapping {
            id,
            name: name.to_string(),
            limit: Some(limit),
            tradeable: true,
            members: true,
        });
        self.set_price(id, high, low);
    }

    pub fn set_price(&self, id: ItemId, high: i64, low: i64) {
        self.latest.lock().unwrap().insert(
            id,
            LatestPrice {
                high: Some(high),
                low: Some(low),
                high_volume: Some(10_000),
                low_volume: Some(10_000),
            },
        );
    }

    /// `count` 5-minute buckets around `mid`, each trading `volume`.
    pub fn set_flat_series(&self, id: ItemId, mid: i64, volume: i64, count: usize) {
        let points = (0..count as i64)
            .map(|i| TimeseriesPoint {
                timestamp: 1_717_500_000 + i * 300,
                avg_high_price: Some(mid + 1),
                avg_low_price: Some(mid - 1),
                high_volume: Some(volume / 2),
                low_volume: Some(volume - volume / 2),
            })
            .collect();
        self.series.lock().unwrap().insert(id, points);
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    fn check(&self, endpoint: &str) -> Result<(), FlipperError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(FlipperError::TransientFetch {
                endpoint: endpoint.to_string(),
                message: msg.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PriceSource for MockSource {
    async fn fetch_latest(&self) -> Result<HashMap<ItemId, LatestPrice>, FlipperError> {
        self.check("latest")?;
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn fetch_mapping(&self) -> Result<Vec<ItemMapping>, FlipperError> {
        self.check("mapping")?;
        Ok(self.mapping.lock().unwrap().clone())
    }

    async fn fetch_timeseries(
        &self,
        item_id: ItemId,
        _granularity: Granularity,
    ) -> Result<Vec<TimeseriesPoint>, FlipperError> {
        self.check("timeseries")?;
        Ok(self.series.lock().unwrap().get(&item_id).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Oracle returning a fixed confidence and recording what it was asked.
pub struct FixedOracle {
    confidence: f64,
    pub seen: Mutex<Vec<Features>>,
}

impl FixedOracle {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ScoringOracle for FixedOracle {
    async fn predict(&self, features: &Features) -> Result<f64, FlipperError> {
        features.validate()?;
        self.seen.lock().unwrap().push(*features);
        Ok(self.confidence)
    }
}
