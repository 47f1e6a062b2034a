//! Exchange tax.
//!
//! `tax = min(floor(price × qty × rate), cap)`, zero for exempt items.
//! Arithmetic is done in `Decimal` so the floor is exact at every size.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashSet;

use crate::types::ItemId;

/// Items the exchange never taxes (bonds, low-level tools and food).
pub const DEFAULT_EXEMPT_ITEMS: [ItemId; 14] = [
    13190, 1755, 5325, 1785, 2347, 1733, 233, 5341, 8794, 5329, 5343, 1735, 952, 5331,
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaxConfig {
    pub rate: Decimal,
    pub cap: i64,
    pub exempt_items: Vec<ItemId>,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            rate: dec!(0.02),
            cap: 5_000_000,
            exempt_items: DEFAULT_EXEMPT_ITEMS.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaxCalculator {
    rate: Decimal,
    cap: i64,
    exempt: HashSet<ItemId>,
}

impl TaxCalculator {
    pub fn new(config: &TaxConfig) -> Self {
        Self {
            rate: config.rate,
            cap: config.cap,
            exempt: config.exempt_items.iter().copied().collect(),
        }
    }

    pub fn is_exempt(&self, item_id: ItemId) -> bool {
        self.exempt.contains(&item_id)
    }

    /// Tax owed on selling `qty` of `item_id` at `price` each.
    pub fn tax(&self, item_id: ItemId, price: i64, qty: i64) -> i64 {
        if self.is_exempt(item_id) || price <= 0 || qty <= 0 {
            return 0;
        }
        let gross = Decimal::from(price) * Decimal::from(qty);
        let raw = (gross * self.rate).floor().to_i64().unwrap_or(self.cap);
        raw.clamp(0, self.cap)
    }

    /// Proceeds after tax.
    pub fn net(&self, item_id: ItemId, price: i64, qty: i64) -> i64 {
        price * qty - self.tax(item_id, price, qty)
    }
}

impl Default for TaxCalculator {
    fn default() -> Self {
        Self::new(&TaxConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
