//! Market data layer.
//!
//! Defines the `PriceSource` trait (the price API boundary) and the
//! injected `Clock`, and provides:
//! - `WikiPriceClient`: reqwest client for the public price API
//! - `MarketDataCache`: TTL-refreshed mapping + latest price snapshot
//! - `TimeseriesCache`: per-(item, granularity) TTL-refreshed history
//! - `indicators`: volatility / momentum / moving-average features

pub mod cache;
pub mod indicators;
pub mod timeseries;
pub mod wiki;

#[cfg(test)]
pub(crate) mod stub;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{FlipperError, Granularity, ItemId, ItemMapping, LatestPrice, TimeseriesPoint};

pub use cache::MarketDataCache;
pub use timeseries::TimeseriesCache;
pub use wiki::WikiPriceClient;

/// Abstraction over the price API.
///
/// Every call is a single bounded fetch; retries are left to the caller.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest instant prices keyed by item id.
    async fn fetch_latest(&self) -> Result<HashMap<ItemId, LatestPrice>, FlipperError>;

    /// Static item metadata for every tradeable item.
    async fn fetch_mapping(&self) -> Result<Vec<ItemMapping>, FlipperError>;

    /// Ordered price/volume history for one item.
    async fn fetch_timeseries(
        &self,
        item_id: ItemId,
        granularity: Granularity,
    ) -> Result<Vec<TimeseriesPoint>, FlipperError>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Time source injected into caches and the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for deterministic tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, t: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = t;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::seconds(31));
        assert_eq!(clock.now(), start + Duration::seconds(31));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
