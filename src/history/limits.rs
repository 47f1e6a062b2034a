//! Rolling buy-limit consumption.
//!
//! Sums buy quantities whose own timestamp falls in `[now - window, now]`.
//! Flips are pre-filtered on their latest activity, which is never earlier
//! than any of their transactions, so the pre-filter cannot drop a
//! qualifying buy.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{FlipQuery, TradeHistoryStore};
use crate::market::Clock;
use crate::types::{ItemId, TradeSide};

pub struct BuyLimitTracker {
    store: Arc<dyn TradeHistoryStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl BuyLimitTracker {
    pub fn new(store: Arc<dyn TradeHistoryStore>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            store,
            clock,
            window,
        }
    }

    /// Quantity bought per item within the window.
    ///
    /// A failed history read yields an empty map.
    pub async fn recently_bought(&self, trader: &str) -> HashMap<ItemId, i64> {
        let now = self.clock.now();
        let start = now - self.window;

        let flips = match self.store.query_flips(trader, &FlipQuery::active_since(start)).await {
            Ok(flips) => flips,
            Err(e) => {
                warn!(trader, error = %e, "Trade history unavailable, assuming no recent buys");
                return HashMap::new();
            }
        };

        let mut bought: HashMap<ItemId, i64> = HashMap::new();
        for tx in flips.iter().flat_map(|f| f.transactions.iter()) {
            if tx.side == TradeSide::Buy && tx.time >= start && tx.time <= now {
                *bought.entry(tx.item_id).or_insert(0) += tx.quantity;
            }
        }

        debug!(trader, items = bought.len(), "Recent buys computed");
        bought
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
