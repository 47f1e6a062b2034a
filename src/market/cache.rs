//! Mapping + latest-price snapshot cache.
//!
//! The snapshot is refreshed as a pair: both endpoints are fetched
//! concurrently and the cache is swapped only when both succeed. On any
//! failure the previous snapshot stays in place untouched.
//!
//! Concurrent refreshes are not de-duplicated. Two callers that both see
//! a stale snapshot will both fetch, and the later swap wins.

use chrono::Duration;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{Clock, PriceSource};
use crate::types::{FlipperError, MarketSnapshot};

pub struct MarketDataCache {
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    snapshot: RwLock<Arc<MarketSnapshot>>,
}

impl MarketDataCache {
    pub fn new(source: Arc<dyn PriceSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            snapshot: RwLock::new(Arc::new(MarketSnapshot::default())),
        }
    }

    /// Refresh the snapshot if it is older than the TTL or was never filled.
    ///
    /// Returns `TransientFetch` when a needed refresh failed; the prior
    /// snapshot is still served by `get()` in that case.
    pub async fn ensure_fresh(&self) -> Result<(), FlipperError> {
        let now = self.clock.now();
        {
            let current = self.snapshot.read().await;
            match current.age(now) {
                Some(age) if age <= self.ttl => {
                    debug!(age_secs = age.num_seconds(), "Market snapshot fresh");
                    return Ok(());
                }
                _ => {}
            }
        }

        info!(source = self.source.name(), "Market snapshot stale, refreshing");
        let (latest, mapping) = tokio::join!(self.source.fetch_latest(), self.source.fetch_mapping());

        match (latest, mapping) {
            (Ok(latest), Ok(mapping)) => {
                let snapshot = MarketSnapshot::new(mapping, latest, now);
                info!(
                    items = snapshot.mapping.len(),
                    priced = snapshot.latest.len(),
                    "Market snapshot updated"
                );
                *self.snapshot.write().await = Arc::new(snapshot);
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Market refresh failed, keeping previous snapshot");
                Err(e)
            }
        }
    }

    /// Current snapshot. Empty until the first successful refresh.
    pub async fn get(&self) -> Arc<MarketSnapshot> {
        self.snapshot.read().await.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
