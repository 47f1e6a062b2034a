//! Profit tracking: ledger ingest, flip queries and FIFO realized profit.

use chrono::Duration;
use std::sync::Arc;

use flipper::history::{FlipQuery, ProfitReconciler, TradeHistoryStore};
use flipper::strategy::tax::TaxCalculator;
use flipper::types::*;

use crate::decision_flow::Harness;
use crate::mock_source::{FixedOracle, MockSource};

fn tx(id: &str, side: TradeSide, item_id: ItemId, quantity: i64, price: i64, time: i64) -> ClientTransaction {
    ClientTransaction {
        id: Some(id.into()),
        side,
        item_id,
        item_name: Some(format!("Item {item_id}")),
        quantity,
        price,
        amount_spent: price * quantity,
        time: Some(time),
    }
}

#[tokio::test]
async fn test_flip_lifecycle_and_realized_profit() {
    let h = Harness::new(MockSource::rune_market(), Arc::new(FixedOracle::new(0.0)));
    let t0 = (h.now() - Duration::hours(3)).timestamp();

    let report = h
        .ledger
        .record(
            "alice",
            vec![
                tx("b1", TradeSide::Buy, 100, 10, 100, t0),
                tx("s1", TradeSide::Sell, 100, 4, 110, t0 + 600),
                tx("s2", TradeSide::Sell, 100, 6, 112, t0 + 1200),
                tx("b2", TradeSide::Buy, 200, 3, 1_000, t0 + 60),
            ],
            h.now(),
        )
        .await
        .unwrap();
    assert_eq!(report.updated.len(), 2);
    assert!(report.rejected.is_empty());

    let closed = h
        .store
        .query_flips("alice", &FlipQuery { closed: Some(true), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(closed.len(), 1);
    let flip = &closed[0];
    assert_eq!(flip.item_id, 100);
    assert_eq!(flip.closed_quantity, 10);
    // tax: floor(440 * 0.02) = 8, floor(672 * 0.02) = 13
    assert_eq!(flip.tax_paid, 21);
    assert_eq!(flip.received_post_tax, 440 + 672 - 21);
    assert_eq!(flip.profit, 1_091 - 1_000);

    let open = h
        .store
        .query_flips("alice", &FlipQuery::open_for_item(200))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].remaining(), 3);

    let txs: Vec<Transaction> = h
        .store
        .load_flips("alice")
        .await
        .unwrap()
        .into_iter()
        .flat_map(|f| f.transactions)
        .collect();
    let summary = ProfitReconciler::new(TaxCalculator::default()).summarize(&txs);
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].item_id, 100);
    assert_eq!(summary[0].matched_quantity, 10);
    assert_eq!(summary[0].total_profit, flip.profit);
    h.cleanup().await;
}

#[tokio::test]
async fn test_replayed_batch_is_idempotent() {
    let h = Harness::new(MockSource::rune_market(), Arc::new(FixedOracle::new(0.0)));
    let t0 = h.now().timestamp();
    let batch = vec![tx("b1", TradeSide::Buy, 100, 10, 100, t0)];

    h.ledger.record("alice", batch.clone(), h.now()).await.unwrap();
    let again = h.ledger.record("alice", batch, h.now()).await.unwrap();
    assert_eq!(again.duplicates, 1);
    assert!(again.updated.is_empty());

    let flips = h.store.load_flips("alice").await.unwrap();
    assert_eq!(flips.len(), 1);
    assert_eq!(flips[0].opened_quantity, 10);
    h.cleanup().await;
}

#[tokio::test]
async fn test_orphan_sell_rejected_without_failing_batch() {
    let h = Harness::new(MockSource::rune_market(), Arc::new(FixedOracle::new(0.0)));
    let t0 = h.now().timestamp();

    let report = h
        .ledger
        .record(
            "alice",
            vec![
                tx("s0", TradeSide::Sell, 300, 5, 50, t0),
                tx("b1", TradeSide::Buy, 100, 10, 100, t0),
            ],
            h.now(),
        )
        .await
        .unwrap();
    assert_eq!(report.rejected.len(), 1);
    assert!(matches!(report.rejected[0].1, FlipperError::InvalidInput(_)));
    assert_eq!(report.updated.len(), 1);
    h.cleanup().await;
}
