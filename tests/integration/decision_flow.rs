//! End-to-end decision scenarios.
//!
//! Wires the real caches, JSON history store, buy-limit tracker and
//! strategy engine against the mock price source and a manual clock.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use flipper::history::{BuyLimitTracker, FlipLedger, TradeHistoryStore};
use flipper::market::{ManualClock, MarketDataCache, TimeseriesCache};
use flipper::scoring::ScoringOracle;
use flipper::storage::JsonHistoryStore;
use flipper::strategy::tax::TaxCalculator;
use flipper::strategy::{StrategyConfig, StrategyEngine};
use flipper::types::*;

use crate::mock_source::{FixedOracle, MockSource};

pub struct Harness {
    pub source: Arc<MockSource>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<JsonHistoryStore>,
    pub engine: StrategyEngine,
    pub ledger: FlipLedger,
}

impl Harness {
    pub fn new(source: MockSource, oracle: Arc<dyn ScoringOracle>) -> Self {
        let source = Arc::new(source);
        let clock = Arc::new(ManualClock::new(start()));
        let mut dir = std::env::temp_dir();
        dir.push(format!("flipper_it_{}", uuid::Uuid::new_v4()));
        let store = Arc::new(JsonHistoryStore::new(dir));
        let tax = TaxCalculator::default();

        let market = Arc::new(MarketDataCache::new(source.clone(), clock.clone(), Duration::seconds(30)));
        let timeseries = Arc::new(TimeseriesCache::new(
            source.clone(),
            clock.clone(),
            Duration::minutes(5),
            Duration::hours(1),
        ));
        let limits = Arc::new(BuyLimitTracker::new(store.clone(), clock.clone(), Duration::hours(4)));
        let engine = StrategyEngine::new(
            &StrategyConfig::default(),
            tax.clone(),
            market,
            timeseries,
            oracle,
            limits,
            clock.clone(),
        );
        let ledger = FlipLedger::new(store.clone(), tax);

        Self {
            source,
            clock,
            store,
            engine,
            ledger,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        use flipper::market::Clock;
        self.clock.now()
    }

    pub async fn cleanup(&self) {
        let _ = tokio::fs::remove_dir_all(self.store.dir()).await;
    }
}

/// Wednesday 2024-06-05 14:00 UTC.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 5, 14, 0, 0).unwrap()
}

fn empty_offer(slot: u8) -> Offer {
    Offer {
        slot,
        item_id: 0,
        side: None,
        status: OfferStatus::Empty,
        price: 0,
        quantity: 0,
        quantity_sold: 0,
        time_placed: None,
    }
}

/// Eight empty slots, `coins` in the inventory.
pub fn request(coins: i64, timeframe: Timeframe) -> SuggestionRequest {
    SuggestionRequest {
        inventory: vec![InventoryEntry { id: 995, amount: coins }],
        offers: (0..8).map(empty_offer).collect(),
        timeframe: Some(timeframe),
    }
}

fn active() -> Timeframe {
    Timeframe::Named("active".into())
}

#[tokio::test]
async fn test_active_spread_buys_rune() {
    let h = Harness::new(MockSource::rune_market(), Arc::new(FixedOracle::new(0.0)));
    let s = h.engine.suggest("alice", &request(40_000, active())).await;

    assert_eq!(s.kind, SuggestionKind::Buy);
    assert_eq!(s.item_id, Some(100));
    assert_eq!(s.price, Some(101));
    assert_eq!(s.quantity, Some(50));
    assert_eq!(s.name.as_deref(), Some("Rune"));
    h.cleanup().await;
}

#[tokio::test]
async fn test_recorded_buys_consume_limit_until_window_passes() {
    let h = Harness::new(MockSource::rune_market(), Arc::new(FixedOracle::new(0.0)));
    let bought_at = h.now() - Duration::hours(1);
    h.ledger
        .record(
            "alice",
            vec![ClientTransaction {
                id: Some("b1".into()),
                side: TradeSide::Buy,
                item_id: 100,
                item_name: Some("Rune".into()),
                quantity: 980,
                price: 100,
                amount_spent: 98_000,
                time: Some(bought_at.timestamp()),
            }],
            h.now(),
        )
        .await
        .unwrap();

    let s = h.engine.suggest("alice", &request(40_000, active())).await;
    assert_eq!(s.quantity, Some(20));

    // Another trader's limit is untouched.
    let s = h.engine.suggest("bob", &request(40_000, active())).await;
    assert_eq!(s.quantity, Some(50));

    h.clock.advance(Duration::hours(4));
    let s = h.engine.suggest("alice", &request(40_000, active())).await;
    assert_eq!(s.quantity, Some(50));
    h.cleanup().await;
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_snapshot() {
    let h = Harness::new(MockSource::rune_market(), Arc::new(FixedOracle::new(0.0)));
    assert_eq!(
        h.engine.suggest("alice", &request(40_000, active())).await.kind,
        SuggestionKind::Buy
    );

    h.source.set_error("price API down");
    h.clock.advance(Duration::minutes(2));

    let s = h.engine.suggest("alice", &request(40_000, active())).await;
    assert_eq!(s.kind, SuggestionKind::Buy);
    assert_eq!(s.price, Some(101));
    assert_eq!(h.engine.price_suggestion(100, TradeSide::Sell).await, Some(110));
    h.cleanup().await;
}

#[tokio::test]
async fn test_cold_start_without_data_waits() {
    let source = MockSource::rune_market();
    source.set_error("unreachable");
    let h = Harness::new(source, Arc::new(FixedOracle::new(0.0)));

    let s = h.engine.suggest("alice", &request(40_000, active())).await;
    assert_eq!(s.kind, SuggestionKind::Wait);
    assert_eq!(s.message, "Waiting for market data");
    assert_eq!(h.engine.price_suggestion(100, TradeSide::Buy).await, None);

    // Recovery on the next call.
    h.source.clear_error();
    let s = h.engine.suggest("alice", &request(40_000, active())).await;
    assert_eq!(s.kind, SuggestionKind::Buy);
    h.cleanup().await;
}

#[tokio::test]
async fn test_stalled_sell_lowered_through_full_path() {
    let h = Harness::new(MockSource::rune_market(), Arc::new(FixedOracle::new(0.0)));
    let mut req = request(40_000, active());
    req.offers[0] = Offer {
        slot: 0,
        item_id: 100,
        side: Some(TradeSide::Sell),
        status: OfferStatus::Active,
        price: 500,
        quantity: 10,
        quantity_sold: 3,
        time_placed: Some(h.now() - Duration::hours(2)),
    };

    let s = h.engine.suggest("alice", &req).await;
    assert_eq!(s.kind, SuggestionKind::Adjust);
    assert_eq!(s.price, Some(499));
    assert_eq!(s.slot, Some(0));
    h.cleanup().await;
}

#[tokio::test]
async fn test_hybrid_uses_oracle_confidence() {
    let source = MockSource::new();
    source.add_item(561, "Nature rune", 10_000, 110, 100);
    source.set_flat_series(561, 100, 3_000, 6);
    let oracle = Arc::new(FixedOracle::new(0.8));
    let h = Harness::new(source, oracle.clone());

    let s = h.engine.suggest("alice", &request(800_000, Timeframe::Minutes(5))).await;
    assert_eq!(s.kind, SuggestionKind::Buy);
    assert_eq!(s.item_id, Some(561));
    assert_eq!(s.price, Some(100));
    assert_eq!(s.quantity, Some(1_000));
    assert_eq!(s.confidence, Some(0.8));

    let seen = oracle.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].strategy_5m, 1);
    assert_eq!(seen[0].buy_day_of_week, 3);
    assert_eq!(seen[0].buy_hour_of_day, 14);
    h.cleanup().await;
}

#[tokio::test]
async fn test_hybrid_threshold_confidence_waits() {
    let source = MockSource::new();
    source.add_item(561, "Nature rune", 10_000, 110, 100);
    source.set_flat_series(561, 100, 3_000, 6);
    let h = Harness::new(source, Arc::new(FixedOracle::new(0.6)));

    let s = h.engine.suggest("alice", &request(800_000, Timeframe::Minutes(5))).await;
    assert_eq!(s.kind, SuggestionKind::Wait);
    h.cleanup().await;
}

#[tokio::test]
async fn test_eight_hour_predicts_sell_price() {
    let source = MockSource::new();
    source.add_item(4, "Wide", 1_000, 150, 100);
    source.set_flat_series(4, 125, 200, 30);
    let h = Harness::new(source, Arc::new(FixedOracle::new(0.9)));

    let s = h.engine.suggest("alice", &request(800_000, Timeframe::Minutes(480))).await;
    assert_eq!(s.kind, SuggestionKind::Buy);
    assert_eq!(s.item_id, Some(4));
    assert_eq!(s.price, Some(100));
    assert_eq!(s.quantity, Some(50));
    assert_eq!(s.predicted_sell_price, Some(180));
    h.cleanup().await;
}

#[tokio::test]
async fn test_persisted_history_survives_new_store() {
    let h = Harness::new(MockSource::rune_market(), Arc::new(FixedOracle::new(0.0)));
    h.ledger
        .record(
            "alice",
            vec![ClientTransaction {
                id: None,
                side: TradeSide::Buy,
                item_id: 100,
                item_name: None,
                quantity: 5,
                price: 100,
                amount_spent: 0,
                time: None,
            }],
            h.now(),
        )
        .await
        .unwrap();

    let reopened = JsonHistoryStore::new(h.store.dir());
    let flips = reopened.load_flips("alice").await.unwrap();
    assert_eq!(flips.len(), 1);
    assert_eq!(flips[0].spent, 500);
    assert_eq!(flips[0].item_name, "Item 100");
    assert_eq!(flips[0].opened_time, h.now());
    h.cleanup().await;
}
