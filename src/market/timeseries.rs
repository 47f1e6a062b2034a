//! Per-(item, granularity) timeseries cache.
//!
//! Entries expire after 5 minutes at the finest granularity and after an
//! hour otherwise. An expired entry is never served: the cache re-fetches,
//! and if that fails the caller gets the error.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Clock, PriceSource};
use crate::types::{FlipperError, Granularity, ItemId, TimeseriesPoint};

struct CacheEntry {
    points: Arc<Vec<TimeseriesPoint>>,
    inserted_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now - self.inserted_at < self.ttl
    }
}

pub struct TimeseriesCache {
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    fine_ttl: Duration,
    coarse_ttl: Duration,
    entries: Mutex<HashMap<(ItemId, Granularity), CacheEntry>>,
}

impl TimeseriesCache {
    pub fn new(
        source: Arc<dyn PriceSource>,
        clock: Arc<dyn Clock>,
        fine_ttl: Duration,
        coarse_ttl: Duration,
    ) -> Self {
        Self {
            source,
            clock,
            fine_ttl,
            coarse_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn ttl_for(&self, granularity: Granularity) -> Duration {
        if granularity.is_finest() {
            self.fine_ttl
        } else {
            self.coarse_ttl
        }
    }

    /// Series for one item, fetched on miss or expiry.
    pub async fn get(
        &self,
        item_id: ItemId,
        granularity: Granularity,
    ) -> Result<Arc<Vec<TimeseriesPoint>>, FlipperError> {
        let key = (item_id, granularity);
        let now = self.clock.now();

        {
            let mut entries = self.entries.lock().await;
            match entries.get(&key) {
                Some(entry) if entry.is_live(now) => return Ok(entry.points.clone()),
                Some(_) => {
                    entries.remove(&key);
                }
                None => {}
            }
        }

        // Lock is not held across the fetch so other items proceed in parallel.
        match self.source.fetch_timeseries(item_id, granularity).await {
            Ok(points) => {
                debug!(item_id, %granularity, points = points.len(), "Timeseries fetched");
                let points = Arc::new(points);
                self.entries.lock().await.insert(
                    key,
                    CacheEntry {
                        points: points.clone(),
                        inserted_at: now,
                        ttl: self.ttl_for(granularity),
                    },
                );
                Ok(points)
            }
            Err(e) => {
                warn!(item_id, %granularity, error = %e, "Timeseries fetch failed");
                Err(e)
            }
        }
    }

    /// Drop expired entries.
    pub async fn evict_expired(&self) {
        let now = self.clock.now();
        self.entries.lock().await.retain(|_, entry| entry.is_live(now));
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
