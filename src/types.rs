//! Shared types for the FLIPPER service.
//!
//! These types form the data model used across all modules: item metadata
//! and prices from the price API, the trader's offers and inventory, the
//! transaction/flip history, and the single `Suggestion` the engine returns.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Numeric item identifier as used by the price API.
pub type ItemId = u32;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// Static item metadata from the `mapping` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMapping {
    pub id: ItemId,
    pub name: String,
    /// Buy limit per rolling window. Absent for a handful of items.
    #[serde(default)]
    pub limit: Option<i64>,
    /// The mapping endpoint omits this for ordinary items.
    #[serde(default = "default_true")]
    pub tradeable: bool,
    #[serde(default)]
    pub members: bool,
}

impl ItemMapping {
    /// Buy limit, treating a missing limit as zero.
    pub fn buy_limit(&self) -> i64 {
        self.limit.unwrap_or(0)
    }
}

/// Latest instant prices for one item.
///
/// `high` is the instant-buy price (what a sell offer fills at), `low` is
/// the instant-sell price (what a buy offer fills at).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestPrice {
    #[serde(default)]
    pub high: Option<i64>,
    #[serde(default)]
    pub low: Option<i64>,
    #[serde(default, alias = "highPriceVolume")]
    pub high_volume: Option<i64>,
    #[serde(default, alias = "lowPriceVolume")]
    pub low_volume: Option<i64>,
}

impl LatestPrice {
    pub fn instant_buy(&self) -> Option<i64> {
        self.high.filter(|p| *p > 0)
    }

    pub fn instant_sell(&self) -> Option<i64> {
        self.low.filter(|p| *p > 0)
    }

    /// Both sides as `(high, low)` when both are known and positive.
    pub fn quotes(&self) -> Option<(i64, i64)> {
        Some((self.instant_buy()?, self.instant_sell()?))
    }

    pub fn total_volume(&self) -> i64 {
        self.high_volume.unwrap_or(0) + self.low_volume.unwrap_or(0)
    }
}

/// Mapping and latest prices captured together.
///
/// A snapshot is only ever built from a complete pair of responses; the
/// cache swaps whole snapshots and never patches one in place.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub mapping: HashMap<ItemId, ItemMapping>,
    pub latest: HashMap<ItemId, LatestPrice>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl MarketSnapshot {
    pub fn new(
        mapping: Vec<ItemMapping>,
        latest: HashMap<ItemId, LatestPrice>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            mapping: mapping.into_iter().map(|m| (m.id, m)).collect(),
            latest,
            fetched_at: Some(fetched_at),
        }
    }

    /// True until the first successful refresh.
    pub fn is_empty(&self) -> bool {
        self.fetched_at.is_none() || self.mapping.is_empty() || self.latest.is_empty()
    }

    pub fn item(&self, id: ItemId) -> Option<&ItemMapping> {
        self.mapping.get(&id)
    }

    pub fn price(&self, id: ItemId) -> Option<&LatestPrice> {
        self.latest.get(&id)
    }

    /// Display name for an item, falling back to a generic label.
    pub fn name_of(&self, id: ItemId) -> String {
        self.mapping
            .get(&id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| format!("Item {id}"))
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.fetched_at.map(|t| now - t)
    }
}

/// Timeseries bucket width accepted by the price API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    Day,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::FiveMinutes => "5m",
            Granularity::OneHour => "1h",
            Granularity::SixHours => "6h",
            Granularity::Day => "24h",
        }
    }

    /// The finest bucket width available.
    pub fn is_finest(&self) -> bool {
        matches!(self, Granularity::FiveMinutes)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One bucket of historical price/volume data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesPoint {
    pub timestamp: i64,
    #[serde(default)]
    pub avg_high_price: Option<i64>,
    #[serde(default)]
    pub avg_low_price: Option<i64>,
    #[serde(default, alias = "highPriceVolume")]
    pub high_volume: Option<i64>,
    #[serde(default, alias = "lowPriceVolume")]
    pub low_volume: Option<i64>,
}

impl TimeseriesPoint {
    /// Mean of the average high and low, when both were traded.
    pub fn mid_price(&self) -> Option<f64> {
        match (self.avg_high_price, self.avg_low_price) {
            (Some(h), Some(l)) if h > 0 && l > 0 => Some((h + l) as f64 / 2.0),
            _ => None,
        }
    }

    pub fn volume(&self) -> i64 {
        self.high_volume.unwrap_or(0) + self.low_volume.unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Trader state
// ---------------------------------------------------------------------------

/// Offer or transaction direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    #[serde(alias = "BUY", alias = "Buy")]
    Buy,
    #[serde(alias = "SELL", alias = "Sell")]
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

impl std::str::FromStr for TradeSide {
    type Err = FlipperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            _ => Err(FlipperError::InvalidInput(format!("unknown side: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    #[serde(alias = "EMPTY")]
    Empty,
    #[serde(alias = "ACTIVE")]
    Active,
    #[serde(alias = "COMPLETED")]
    Completed,
}

/// Status as the client may send it. The game client folds the side into
/// the status (`buy`, `sold`, ...) and omits `type`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ClientStatus {
    #[serde(alias = "EMPTY")]
    Empty,
    #[serde(alias = "ACTIVE")]
    Active,
    #[serde(alias = "COMPLETED")]
    Completed,
    #[serde(alias = "BUY")]
    Buy,
    #[serde(alias = "SELL")]
    Sell,
    #[serde(alias = "BOUGHT")]
    Bought,
    #[serde(alias = "SOLD")]
    Sold,
}

impl ClientStatus {
    fn split(self) -> (OfferStatus, Option<TradeSide>) {
        match self {
            ClientStatus::Empty => (OfferStatus::Empty, None),
            ClientStatus::Active => (OfferStatus::Active, None),
            ClientStatus::Completed => (OfferStatus::Completed, None),
            ClientStatus::Buy => (OfferStatus::Active, Some(TradeSide::Buy)),
            ClientStatus::Sell => (OfferStatus::Active, Some(TradeSide::Sell)),
            ClientStatus::Bought => (OfferStatus::Completed, Some(TradeSide::Buy)),
            ClientStatus::Sold => (OfferStatus::Completed, Some(TradeSide::Sell)),
        }
    }
}

/// One exchange slot as reported by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ClientOffer")]
pub struct Offer {
    #[serde(default)]
    pub slot: u8,
    #[serde(default, alias = "itemId")]
    pub item_id: ItemId,
    /// Empty slots carry no side.
    #[serde(rename = "type", default)]
    pub side: Option<TradeSide>,
    pub status: OfferStatus,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub quantity: i64,
    #[serde(rename = "quantitySold", alias = "quantity_sold", default)]
    pub quantity_sold: i64,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub time_placed: Option<DateTime<Utc>>,
}

/// Wire shape of an offer before the status is normalised.
#[derive(Deserialize)]
struct ClientOffer {
    #[serde(default)]
    slot: u8,
    #[serde(default, alias = "itemId")]
    item_id: ItemId,
    #[serde(rename = "type", default)]
    side: Option<TradeSide>,
    status: ClientStatus,
    #[serde(default)]
    price: i64,
    #[serde(default)]
    quantity: i64,
    #[serde(rename = "quantitySold", alias = "quantity_sold", default)]
    quantity_sold: i64,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    time_placed: Option<DateTime<Utc>>,
}

impl From<ClientOffer> for Offer {
    fn from(raw: ClientOffer) -> Self {
        let (status, implied) = raw.status.split();
        Offer {
            slot: raw.slot,
            item_id: raw.item_id,
            side: raw.side.or(implied),
            status,
            price: raw.price,
            quantity: raw.quantity,
            quantity_sold: raw.quantity_sold,
            time_placed: raw.time_placed,
        }
    }
}

impl Offer {
    pub fn is_empty(&self) -> bool {
        self.status == OfferStatus::Empty
    }

    /// Every unit of the offer has traded.
    pub fn is_filled(&self) -> bool {
        self.quantity > 0 && self.quantity_sold >= self.quantity
    }

    /// Non-empty and still waiting on fills.
    pub fn is_open(&self) -> bool {
        !self.is_empty() && self.status != OfferStatus::Completed && !self.is_filled()
    }

    /// Time since placement, if the client reported it.
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.time_placed.map(|t| now - t)
    }
}

/// One inventory stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    #[serde(alias = "item_id")]
    pub id: ItemId,
    #[serde(default)]
    pub amount: i64,
}

/// Snapshot of what a trader holds and has listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraderState {
    #[serde(default)]
    pub inventory: Vec<InventoryEntry>,
    #[serde(default)]
    pub offers: Vec<Offer>,
}

impl TraderState {
    /// Amount of the currency item in the inventory.
    pub fn coins(&self, currency_item: ItemId) -> i64 {
        self.inventory
            .iter()
            .filter(|e| e.id == currency_item)
            .map(|e| e.amount)
            .sum()
    }

    /// Items backing a non-empty offer.
    pub fn offered_items(&self) -> HashSet<ItemId> {
        self.offers
            .iter()
            .filter(|o| !o.is_empty())
            .map(|o| o.item_id)
            .collect()
    }

    /// Items backing an offer or sitting in the inventory.
    pub fn held_items(&self) -> HashSet<ItemId> {
        let mut held = self.offered_items();
        held.extend(self.inventory.iter().filter(|e| e.amount > 0).map(|e| e.id));
        held
    }

    pub fn busy_slots(&self) -> usize {
        self.offers.iter().filter(|o| !o.is_empty()).count()
    }

    pub fn empty_slots(&self, total_slots: usize) -> usize {
        total_slots.saturating_sub(self.busy_slots())
    }
}

/// Caller-supplied strategy selector: minutes (`5`, `480`) or a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timeframe {
    Minutes(u32),
    Named(String),
}

/// Body of a suggestion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionRequest {
    #[serde(default)]
    pub inventory: Vec<InventoryEntry>,
    #[serde(default)]
    pub offers: Vec<Offer>,
    #[serde(default)]
    pub timeframe: Option<Timeframe>,
}

impl SuggestionRequest {
    pub fn trader_state(&self) -> TraderState {
        TraderState {
            inventory: self.inventory.clone(),
            offers: self.offers.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transactions & flips
// ---------------------------------------------------------------------------

/// A transaction as reported by the client; ids and times may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientTransaction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub side: TradeSide,
    #[serde(alias = "itemId")]
    pub item_id: ItemId,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub price: i64,
    #[serde(default, alias = "amountSpent")]
    pub amount_spent: i64,
    /// Unix seconds.
    #[serde(default)]
    pub time: Option<i64>,
}

impl ClientTransaction {
    /// Fill in a generated id, a default name and "now" for a missing time.
    pub fn normalize(self, now: DateTime<Utc>) -> Transaction {
        let time = self
            .time
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(now);
        Transaction {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            side: self.side,
            item_id: self.item_id,
            item_name: self
                .item_name
                .unwrap_or_else(|| format!("Item {}", self.item_id)),
            quantity: self.quantity.max(0),
            price: self.price.max(0),
            amount_spent: self.amount_spent.max(0),
            time,
        }
    }
}

/// A completed fill recorded against a trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub item_id: ItemId,
    pub item_name: String,
    pub quantity: i64,
    pub price: i64,
    pub amount_spent: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time: DateTime<Utc>,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x {} @ {}gp ({})",
            self.side,
            self.quantity,
            self.item_name,
            self.price,
            self.time.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

/// Aggregated buy-then-sell position for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flip {
    pub id: String,
    pub item_id: ItemId,
    pub item_name: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub opened_time: DateTime<Utc>,
    pub opened_quantity: i64,
    pub spent: i64,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub closed_time: Option<DateTime<Utc>>,
    pub closed_quantity: i64,
    pub received_post_tax: i64,
    pub profit: i64,
    pub tax_paid: i64,
    pub is_closed: bool,
    /// Append-only, in arrival order.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Flip {
    /// Empty open flip for an item, opened at `time`.
    pub fn opened(id: String, item_id: ItemId, item_name: String, time: DateTime<Utc>) -> Self {
        Self {
            id,
            item_id,
            item_name,
            opened_time: time,
            opened_quantity: 0,
            spent: 0,
            closed_time: None,
            closed_quantity: 0,
            received_post_tax: 0,
            profit: 0,
            tax_paid: 0,
            is_closed: false,
            transactions: Vec::new(),
        }
    }

    /// Quantity bought but not yet sold.
    pub fn remaining(&self) -> i64 {
        (self.opened_quantity - self.closed_quantity).max(0)
    }

    pub fn avg_buy_price(&self) -> f64 {
        if self.opened_quantity > 0 {
            self.spent as f64 / self.opened_quantity as f64
        } else {
            0.0
        }
    }

    /// Latest moment anything happened on this flip.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.transactions
            .iter()
            .map(|t| t.time)
            .chain(self.closed_time)
            .fold(self.opened_time, |acc, t| acc.max(t))
    }
}

impl fmt::Display for Flip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}/{} sold | spent={}gp received={}gp profit={}gp tax={}gp{}",
            self.item_name,
            self.item_id,
            self.closed_quantity,
            self.opened_quantity,
            self.spent,
            self.received_post_tax,
            self.profit,
            self.tax_paid,
            if self.is_closed { " (closed)" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Suggestion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Buy,
    Sell,
    Adjust,
    Wait,
    Collect,
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestionKind::Buy => write!(f, "buy"),
            SuggestionKind::Sell => write!(f, "sell"),
            SuggestionKind::Adjust => write!(f, "adjust"),
            SuggestionKind::Wait => write!(f, "wait"),
            SuggestionKind::Collect => write!(f, "collect"),
        }
    }
}

/// The single next action for a trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_sell_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Suggestion {
    fn bare(kind: SuggestionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            item_id: None,
            price: None,
            quantity: None,
            name: None,
            slot: None,
            predicted_sell_price: None,
            confidence: None,
        }
    }

    pub fn wait(message: impl Into<String>) -> Self {
        Self::bare(SuggestionKind::Wait, message)
    }

    pub fn collect(offer: &Offer, name: String) -> Self {
        let side = offer.side.map(|s| s.to_string()).unwrap_or_else(|| "completed".into());
        Self {
            item_id: Some(offer.item_id),
            slot: Some(offer.slot),
            ..Self::bare(
                SuggestionKind::Collect,
                format!("Collect your completed {side} offer for {name}"),
            )
            .named(name)
        }
    }

    pub fn adjust(offer: &Offer, new_price: i64, message: impl Into<String>, name: String) -> Self {
        Self {
            item_id: Some(offer.item_id),
            price: Some(new_price),
            quantity: Some(offer.quantity),
            slot: Some(offer.slot),
            ..Self::bare(SuggestionKind::Adjust, message).named(name)
        }
    }

    pub fn sell(item_id: ItemId, name: String, price: i64, quantity: i64) -> Self {
        Self {
            item_id: Some(item_id),
            price: Some(price),
            quantity: Some(quantity),
            ..Self::bare(SuggestionKind::Sell, format!("Sell your {quantity} {name}")).named(name)
        }
    }

    pub fn buy(
        item_id: ItemId,
        name: String,
        price: i64,
        quantity: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            item_id: Some(item_id),
            price: Some(price),
            quantity: Some(quantity),
            ..Self::bare(SuggestionKind::Buy, message).named(name)
        }
    }

    fn named(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let (Some(id), Some(price), Some(qty)) = (self.item_id, self.price, self.quantity) {
            write!(f, " [item={id} price={price} qty={qty}]")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for FLIPPER.
#[derive(Debug, thiserror::Error)]
pub enum FlipperError {
    #[error("Price API fetch failed ({endpoint}): {message}")]
    TransientFetch { endpoint: String, message: String },

    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Candidate {item_id} excluded: {message}")]
    PartialCandidate { item_id: ItemId, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Trade history error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
