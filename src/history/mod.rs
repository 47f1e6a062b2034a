//! Trade history.
//!
//! Defines the `TradeHistoryStore` trait (per-trader flip collection) and
//! the components built on it:
//! - `FlipLedger`: folds client transactions into flips
//! - `BuyLimitTracker`: rolling-window bought quantities per item
//! - `ProfitReconciler`: FIFO buy/sell matching for realized profit

pub mod ledger;
pub mod limits;
pub mod memory;
pub mod reconcile;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::{Flip, FlipperError, ItemId};

pub use ledger::{FlipLedger, LedgerReport};
pub use limits::BuyLimitTracker;
pub use memory::MemoryHistoryStore;
pub use reconcile::{ItemProfit, MatchedTrade, ProfitReconciler, Reconciliation};

/// Filter over a trader's flips.
///
/// The time range selects flips whose activity overlaps `[from, to]`:
/// opened no later than `to`, and last touched no earlier than `from`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FlipQuery {
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed: Option<bool>,
}

impl FlipQuery {
    /// Flips with any activity at or after `since`.
    pub fn active_since(since: DateTime<Utc>) -> Self {
        Self {
            from: Some(since),
            ..Default::default()
        }
    }

    pub fn open_for_item(item_id: ItemId) -> Self {
        Self {
            item_id: Some(item_id),
            closed: Some(false),
            ..Default::default()
        }
    }

    pub fn matches(&self, flip: &Flip) -> bool {
        if self.item_id.is_some_and(|id| id != flip.item_id) {
            return false;
        }
        if self.closed.is_some_and(|c| c != flip.is_closed) {
            return false;
        }
        if self.to.is_some_and(|to| flip.opened_time > to) {
            return false;
        }
        if self.from.is_some_and(|from| flip.last_activity() < from) {
            return false;
        }
        true
    }
}

/// Per-trader flip persistence.
///
/// Writes are upserts keyed by flip id; flips not named in a write are
/// left alone.
#[async_trait]
pub trait TradeHistoryStore: Send + Sync {
    /// Every flip recorded for the trader. Unknown traders have none.
    async fn load_flips(&self, trader: &str) -> Result<Vec<Flip>, FlipperError>;

    /// Insert or replace the given flips by id.
    async fn save_flips(&self, trader: &str, flips: &[Flip]) -> Result<(), FlipperError>;

    /// Flips matching a filter.
    async fn query_flips(&self, trader: &str, query: &FlipQuery) -> Result<Vec<Flip>, FlipperError> {
        let flips = self.load_flips(trader).await?;
        Ok(flips.into_iter().filter(|f| query.matches(f)).collect())
    }
}

/// Merge `updates` into `existing` by flip id, preserving existing order.
pub fn merge_flips(existing: &mut Vec<Flip>, updates: &[Flip]) {
    for flip in updates {
        match existing.iter_mut().find(|f| f.id == flip.id) {
            Some(slot) => *slot = flip.clone(),
            None => existing.push(flip.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn flip(id: &str, item: ItemId, opened: i64, closed: bool) -> Flip {
        let mut f = Flip::opened(
            id.into(),
            item,
            "x".into(),
            Utc.timestamp_opt(opened, 0).unwrap(),
        );
        f.is_closed = closed;
        f
    }

    #[test]
    fn test_query_filters() {
        let f = flip("a", 5, 10_000, false);
        assert!(FlipQuery::default().matches(&f));
        assert!(FlipQuery::open_for_item(5).matches(&f));
        assert!(!FlipQuery::open_for_item(6).matches(&f));
        assert!(!FlipQuery { closed: Some(true), ..Default::default() }.matches(&f));
    }

    #[test]
    fn test_query_time_overlap() {
        let mut f = flip("a", 5, 10_000, true);
        f.closed_time = Some(Utc.timestamp_opt(20_000, 0).unwrap());
        let at = |s| Utc.timestamp_opt(s, 0).unwrap();

        assert!(FlipQuery::active_since(at(15_000)).matches(&f));
        assert!(!FlipQuery::active_since(at(20_001)).matches(&f));
        assert!(!FlipQuery { to: Some(at(9_999)), ..Default::default() }.matches(&f));
        assert!(FlipQuery { to: Some(at(10_000)), ..Default::default() }.matches(&f));
    }

    #[test]
    fn test_merge_flips_upserts() {
        let mut existing = vec![flip("a", 1, 0, false), flip("b", 2, 0, false)];
        let mut changed = flip("b", 2, 0, true);
        changed.profit = 42;
        merge_flips(&mut existing, &[changed, flip("c", 3, 0, false)]);
        assert_eq!(existing.len(), 3);
        assert_eq!(existing[1].profit, 42);
        assert_eq!(existing[2].id, "c");
    }
}
