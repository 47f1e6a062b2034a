//! FIFO trade reconciliation.
//!
//! For one item, buys and sells are each ordered by time (ties keep arrival
//! order) and matched oldest-against-oldest. Each match closes
//! `min(buy_left, sell_left)` units; whichever lot is used up advances.
//! What remains on either side after one list runs dry stays open.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::strategy::tax::TaxCalculator;
use crate::types::{ItemId, TradeSide, Transaction};

/// One matched buy/sell pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedTrade {
    pub item_id: ItemId,
    pub buy_tx_id: String,
    pub sell_tx_id: String,
    pub quantity: i64,
    pub buy_price: i64,
    pub sell_price: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub bought_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub sold_at: DateTime<Utc>,
    pub spent: i64,
    pub tax: i64,
    pub received_post_tax: i64,
    pub profit: i64,
}

/// Unmatched remainder of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenLot {
    pub tx_id: String,
    pub side: TradeSide,
    pub quantity: i64,
    pub price: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reconciliation {
    pub matches: Vec<MatchedTrade>,
    pub open_buys: Vec<OpenLot>,
    pub open_sells: Vec<OpenLot>,
}

impl Reconciliation {
    pub fn matched_quantity(&self) -> i64 {
        self.matches.iter().map(|m| m.quantity).sum()
    }

    pub fn total_profit(&self) -> i64 {
        self.matches.iter().map(|m| m.profit).sum()
    }
}

/// Realized profit for one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemProfit {
    pub item_id: ItemId,
    pub item_name: String,
    pub matched_quantity: i64,
    pub flip_count: usize,
    pub total_profit: i64,
    pub total_tax: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ProfitReconciler {
    tax: TaxCalculator,
}

impl ProfitReconciler {
    pub fn new(tax: TaxCalculator) -> Self {
        Self { tax }
    }

    /// Match all transactions of a single item.
    pub fn reconcile_item(&self, item_id: ItemId, txs: &[Transaction]) -> Reconciliation {
        let mut buys = lots(txs, item_id, TradeSide::Buy);
        let mut sells = lots(txs, item_id, TradeSide::Sell);

        let mut matches = Vec::new();
        let (mut bi, mut si) = (0, 0);

        while bi < buys.len() && si < sells.len() {
            let qty = buys[bi].quantity.min(sells[si].quantity);
            let (buy, sell) = (&buys[bi], &sells[si]);

            let spent = buy.price * qty;
            let tax = self.tax.tax(item_id, sell.price, qty);
            let received = sell.price * qty - tax;
            matches.push(MatchedTrade {
                item_id,
                buy_tx_id: buy.tx_id.clone(),
                sell_tx_id: sell.tx_id.clone(),
                quantity: qty,
                buy_price: buy.price,
                sell_price: sell.price,
                bought_at: buy.time,
                sold_at: sell.time,
                spent,
                tax,
                received_post_tax: received,
                profit: received - spent,
            });

            buys[bi].quantity -= qty;
            sells[si].quantity -= qty;
            if buys[bi].quantity == 0 {
                bi += 1;
            }
            if sells[si].quantity == 0 {
                si += 1;
            }
        }

        debug!(item_id, matches = matches.len(), "Item reconciled");
        Reconciliation {
            matches,
            open_buys: buys.split_off(bi),
            open_sells: sells.split_off(si),
        }
    }

    /// Match every item independently.
    pub fn reconcile_all(&self, txs: &[Transaction]) -> BTreeMap<ItemId, Reconciliation> {
        let mut by_item: BTreeMap<ItemId, Vec<Transaction>> = BTreeMap::new();
        for tx in txs {
            by_item.entry(tx.item_id).or_default().push(tx.clone());
        }
        by_item
            .into_iter()
            .map(|(id, item_txs)| (id, self.reconcile_item(id, &item_txs)))
            .collect()
    }

    /// Per-item realized profit, highest first; ties on lower item id.
    pub fn summarize(&self, txs: &[Transaction]) -> Vec<ItemProfit> {
        let names: BTreeMap<ItemId, &str> = txs
            .iter()
            .map(|t| (t.item_id, t.item_name.as_str()))
            .collect();

        let mut summary: Vec<ItemProfit> = self
            .reconcile_all(txs)
            .into_iter()
            .filter(|(_, r)| !r.matches.is_empty())
            .map(|(item_id, r)| ItemProfit {
                item_id,
                item_name: names
                    .get(&item_id)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("Item {item_id}")),
                matched_quantity: r.matched_quantity(),
                flip_count: r.matches.len(),
                total_profit: r.total_profit(),
                total_tax: r.matches.iter().map(|m| m.tax).sum(),
            })
            .collect();

        summary.sort_by(|a, b| {
            b.total_profit
                .cmp(&a.total_profit)
                .then(a.item_id.cmp(&b.item_id))
        });
        summary
    }
}

fn lots(txs: &[Transaction], item_id: ItemId, side: TradeSide) -> Vec<OpenLot> {
    let mut lots: Vec<OpenLot> = txs
        .iter()
        .filter(|t| t.item_id == item_id && t.side == side && t.quantity > 0)
        .map(|t| OpenLot {
            tx_id: t.id.clone(),
            side,
            quantity: t.quantity,
            price: t.price,
            time: t.time,
        })
        .collect();
    // Stable: equal timestamps keep arrival order.
    lots.sort_by_key(|l| l.time);
    lots
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
