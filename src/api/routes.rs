//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::history::{FlipLedger, FlipQuery, ItemProfit, ProfitReconciler, TradeHistoryStore};
use crate::market::Clock;
use crate::strategy::StrategyEngine;
use crate::types::{
    ClientTransaction, Flip, FlipperError, ItemId, Suggestion, SuggestionRequest, TradeSide,
    Transaction,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub engine: Arc<StrategyEngine>,
    pub ledger: Arc<FlipLedger>,
    pub store: Arc<dyn TradeHistoryStore>,
    pub reconciler: ProfitReconciler,
    pub clock: Arc<dyn Clock>,
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A `FlipperError` rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub FlipperError);

impl From<FlipperError> for ApiError {
    fn from(e: FlipperError) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FlipperError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FlipperError::DataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            FlipperError::TransientFetch { .. } => StatusCode::BAD_GATEWAY,
            FlipperError::PartialCandidate { .. }
            | FlipperError::Persistence(_)
            | FlipperError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = %status, error = %self.0, "Request failed");
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn require_name(name: Option<String>, field: &str) -> Result<String, ApiError> {
    match name.map(|n| n.trim().to_string()) {
        Some(n) if !n.is_empty() => Ok(n),
        _ => Err(FlipperError::InvalidInput(format!("missing {field}")).into()),
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TraderParams {
    pub trader: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisplayNameParams {
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PriceParams {
    pub item_id: ItemId,
    #[serde(default = "default_side", rename = "type", alias = "side")]
    pub side: TradeSide,
}

fn default_side() -> TradeSide {
    TradeSide::Buy
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceResponse {
    pub item_id: ItemId,
    pub price: Option<i64>,
}

/// Flip listing filter. Times are unix seconds.
#[derive(Debug, Deserialize)]
pub struct FlipParams {
    pub display_name: Option<String>,
    pub item_id: Option<ItemId>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub closed: Option<bool>,
}

impl FlipParams {
    fn query(&self) -> Result<FlipQuery, FlipperError> {
        let at = |secs: i64| {
            Utc.timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| FlipperError::InvalidInput(format!("bad timestamp {secs}")))
        };
        Ok(FlipQuery {
            item_id: self.item_id,
            from: self.from.map(at).transpose()?,
            to: self.to.map(at).transpose()?,
            closed: self.closed,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub time: String,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// POST /suggestion
pub async fn post_suggestion(
    State(state): State<AppState>,
    Query(params): Query<TraderParams>,
    Json(request): Json<SuggestionRequest>,
) -> ApiResult<Suggestion> {
    let trader = require_name(params.trader, "trader")?;
    Ok(Json(state.engine.suggest(&trader, &request).await))
}

/// GET /price-suggestion
pub async fn get_price_suggestion(
    State(state): State<AppState>,
    Query(params): Query<PriceParams>,
) -> Json<PriceResponse> {
    let price = state.engine.price_suggestion(params.item_id, params.side).await;
    debug!(item_id = params.item_id, side = %params.side, ?price, "Price suggestion");
    Json(PriceResponse {
        item_id: params.item_id,
        price,
    })
}

/// POST /profit-tracking/client-transactions
///
/// Returns the flips the batch touched.
pub async fn post_client_transactions(
    State(state): State<AppState>,
    Query(params): Query<DisplayNameParams>,
    Json(transactions): Json<Vec<ClientTransaction>>,
) -> ApiResult<Vec<Flip>> {
    let trader = require_name(params.display_name, "display_name")?;
    let report = state
        .ledger
        .record(&trader, transactions, state.clock.now())
        .await?;
    Ok(Json(report.updated))
}

/// GET /profit-tracking/client-flips
///
/// Most recently closed first; open flips last.
pub async fn get_client_flips(
    State(state): State<AppState>,
    Query(params): Query<FlipParams>,
) -> ApiResult<Vec<Flip>> {
    let query = params.query()?;
    let trader = require_name(params.display_name, "display_name")?;
    let mut flips = state.store.query_flips(&trader, &query).await?;
    flips.sort_by(|a, b| b.closed_time.cmp(&a.closed_time));
    Ok(Json(flips))
}

/// GET /profit-tracking/realized
pub async fn get_realized(
    State(state): State<AppState>,
    Query(params): Query<DisplayNameParams>,
) -> ApiResult<Vec<ItemProfit>> {
    let trader = require_name(params.display_name, "display_name")?;
    let flips = state.store.load_flips(&trader).await?;
    let txs: Vec<Transaction> = flips.into_iter().flat_map(|f| f.transactions).collect();
    Ok(Json(state.reconciler.summarize(&txs)))
}

/// GET /health
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
            time: Utc::now().to_rfc3339(),
        }),
    )
}
