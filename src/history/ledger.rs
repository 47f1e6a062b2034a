//! Flip ledger: folds reported transactions into per-item flips.
//!
//! A buy attaches to the oldest open flip for its item, or opens a new one.
//! A sell attaches to the oldest open flip and closes at most what that
//! flip still holds; anything beyond is dropped with a warning and the
//! recorded proceeds and tax cover only the closed part.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::TradeHistoryStore;
use crate::strategy::tax::TaxCalculator;
use crate::types::{ClientTransaction, Flip, FlipperError, TradeSide, Transaction};

/// Outcome of one ingest call.
#[derive(Debug, Default)]
pub struct LedgerReport {
    /// Flips touched by this batch, in first-touched order.
    pub updated: Vec<Flip>,
    /// Transactions that could not be applied, with the reason.
    pub rejected: Vec<(Transaction, FlipperError)>,
    /// Transactions already recorded under the same id.
    pub duplicates: usize,
}

pub struct FlipLedger {
    store: Arc<dyn TradeHistoryStore>,
    tax: TaxCalculator,
    /// One lock per trader, held across load-apply-save.
    traders: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FlipLedger {
    pub fn new(store: Arc<dyn TradeHistoryStore>, tax: TaxCalculator) -> Self {
        Self {
            store,
            tax,
            traders: Mutex::new(HashMap::new()),
        }
    }

    async fn trader_lock(&self, trader: &str) -> Arc<Mutex<()>> {
        self.traders
            .lock()
            .await
            .entry(trader.to_string())
            .or_default()
            .clone()
    }

    /// Record a batch of client transactions for a trader.
    ///
    /// Individual bad transactions are rejected in the report; only a
    /// store failure fails the call.
    pub async fn record(
        &self,
        trader: &str,
        incoming: Vec<ClientTransaction>,
        now: DateTime<Utc>,
    ) -> Result<LedgerReport, FlipperError> {
        let lock = self.trader_lock(trader).await;
        let _guard = lock.lock().await;

        let mut flips = self.store.load_flips(trader).await?;
        let mut seen: HashSet<String> = flips
            .iter()
            .flat_map(|f| f.transactions.iter().map(|t| t.id.clone()))
            .collect();

        let mut report = LedgerReport::default();
        let mut touched: Vec<String> = Vec::new();

        for raw in incoming {
            let tx = raw.normalize(now);
            if !seen.insert(tx.id.clone()) {
                debug!(trader, tx_id = %tx.id, "Duplicate transaction skipped");
                report.duplicates += 1;
                continue;
            }
            match self.apply(&mut flips, tx.clone()) {
                Ok(flip_id) => {
                    if !touched.contains(&flip_id) {
                        touched.push(flip_id);
                    }
                }
                Err(e) => {
                    warn!(trader, tx_id = %tx.id, item_id = tx.item_id, error = %e, "Transaction rejected");
                    report.rejected.push((tx, e));
                }
            }
        }

        report.updated = touched
            .iter()
            .filter_map(|id| flips.iter().find(|f| &f.id == id).cloned())
            .collect();

        if !report.updated.is_empty() {
            self.store.save_flips(trader, &report.updated).await?;
        }

        info!(
            trader,
            updated = report.updated.len(),
            rejected = report.rejected.len(),
            duplicates = report.duplicates,
            "Transactions recorded"
        );
        Ok(report)
    }

    /// Apply one transaction to the working set, returning the flip id.
    pub fn apply(&self, flips: &mut Vec<Flip>, tx: Transaction) -> Result<String, FlipperError> {
        if tx.quantity <= 0 {
            return Err(FlipperError::InvalidInput(format!(
                "transaction {} has non-positive quantity",
                tx.id
            )));
        }

        let open = flips
            .iter()
            .enumerate()
            .filter(|(_, f)| f.item_id == tx.item_id && !f.is_closed)
            .min_by_key(|(_, f)| f.opened_time)
            .map(|(i, _)| i);

        match (tx.side, open) {
            (TradeSide::Buy, Some(idx)) => {
                let flip = &mut flips[idx];
                apply_buy(flip, tx);
                Ok(flip.id.clone())
            }
            (TradeSide::Buy, None) => {
                let mut flip = Flip::opened(
                    uuid::Uuid::new_v4().to_string(),
                    tx.item_id,
                    tx.item_name.clone(),
                    tx.time,
                );
                apply_buy(&mut flip, tx);
                let id = flip.id.clone();
                flips.push(flip);
                Ok(id)
            }
            (TradeSide::Sell, Some(idx)) => {
                let flip = &mut flips[idx];
                self.apply_sell(flip, tx);
                Ok(flip.id.clone())
            }
            (TradeSide::Sell, None) => Err(FlipperError::InvalidInput(format!(
                "sell of item {} with no open flip",
                tx.item_id
            ))),
        }
    }

    fn apply_sell(&self, flip: &mut Flip, mut tx: Transaction) {
        let reported = tx.quantity;
        let closing = reported.min(flip.remaining());
        let gross = gross_amount(&tx) * closing / reported;

        if closing < reported {
            warn!(
                flip_id = %flip.id,
                item_id = tx.item_id,
                reported,
                closing,
                "Sell exceeds open quantity, excess ignored"
            );
            tx.quantity = closing;
            tx.amount_spent = gross;
        }

        let tax = self.tax.tax(tx.item_id, tx.price, closing);
        flip.closed_quantity += closing;
        flip.received_post_tax += gross - tax;
        flip.tax_paid += tax;
        flip.closed_time = Some(tx.time);
        if flip.closed_quantity >= flip.opened_quantity {
            flip.is_closed = true;
        }
        flip.transactions.push(tx);
        update_profit(flip);
    }
}

fn gross_amount(tx: &Transaction) -> i64 {
    if tx.amount_spent > 0 {
        tx.amount_spent
    } else {
        tx.price * tx.quantity
    }
}

fn apply_buy(flip: &mut Flip, tx: Transaction) {
    flip.opened_quantity += tx.quantity;
    flip.spent += gross_amount(&tx);
    flip.is_closed = flip.closed_quantity >= flip.opened_quantity;
    flip.transactions.push(tx);
    update_profit(flip);
}

fn update_profit(flip: &mut Flip) {
    flip.profit = if flip.opened_quantity > 0 {
        (flip.received_post_tax as f64 - flip.avg_buy_price() * flip.closed_quantity as f64).round()
            as i64
    } else {
        flip.received_post_tax
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
