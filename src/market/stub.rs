//! In-memory `PriceSource` for unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::PriceSource;
use crate::types::{FlipperError, Granularity, ItemId, ItemMapping, LatestPrice, TimeseriesPoint};

#[derive(Default)]
pub(crate) struct StubSource {
    pub mapping: Mutex<Vec<ItemMapping>>,
    pub latest: Mutex<HashMap<ItemId, LatestPrice>>,
    pub series: Mutex<HashMap<ItemId, Vec<TimeseriesPoint>>>,
    pub fail_latest: AtomicBool,
    pub fail_mapping: AtomicBool,
    pub fail_series_for: Mutex<HashSet<ItemId>>,
    pub latest_calls: AtomicUsize,
    pub mapping_calls: AtomicUsize,
    pub series_calls: AtomicUsize,
}

impl StubSource {
    pub fn with_item(id: ItemId, name: &str, limit: i64, high: i64, low: i64) -> Self {
        let stub = Self::default();
        stub.add_item(id, name, limit, high, low);
        stub
    }

    pub fn add_item(&self, id: ItemId, name: &str, limit: i64, high: i64, low: i64) {
        self.mapping.lock().unwrap().push(ItemMapping {
            id,
            name: name.to_string(),
            limit: Some(limit),
            tradeable: true,
            members: false,
        });
        self.latest.lock().unwrap().insert(
            id,
            LatestPrice {
                high: Some(high),
                low: Some(low),
                ..Default::default()
            },
        );
    }

    pub fn set_series(&self, id: ItemId, points: Vec<TimeseriesPoint>) {
        self.series.lock().unwrap().insert(id, points);
    }
}

fn stub_error(endpoint: &str) -> FlipperError {
    FlipperError::TransientFetch {
        endpoint: endpoint.to_string(),
        message: "stubbed failure".to_string(),
    }
}

#[async_trait]
impl PriceSource for StubSource {
    async fn fetch_latest(&self) -> Result<HashMap<ItemId, LatestPrice>, FlipperError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_latest.load(Ordering::SeqCst) {
            return Err(stub_error("latest"));
        }
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn fetch_mapping(&self) -> Result<Vec<ItemMapping>, FlipperError> {
        self.mapping_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mapping.load(Ordering::SeqCst) {
            return Err(stub_error("mapping"));
        }
        Ok(self.mapping.lock().unwrap().clone())
    }

    async fn fetch_timeseries(
        &self,
        item_id: ItemId,
        _granularity: Granularity,
    ) -> Result<Vec<TimeseriesPoint>, FlipperError> {
        self.series_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_series_for.lock().unwrap().contains(&item_id) {
            return Err(stub_error("timeseries"));
        }
        Ok(self
            .series
            .lock()
            .unwrap()
            .get(&item_id)
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "stub"
    }
}
