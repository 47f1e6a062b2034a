//! Price API client.
//!
//! API docs: https://oldschool.runescape.wiki/w/RuneScape:Real-time_Prices
//! Base URL: https://prices.runescape.wiki/api/v1/osrs
//! Auth: none, but a descriptive User-Agent is required.
//!
//! `latest` carries no volumes, so the hourly bulk endpoint is fetched
//! alongside it and its volumes are folded into each `LatestPrice`. A
//! failed volume fetch is tolerated; a failed `latest` fetch is not.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

use super::PriceSource;
use crate::config::PriceApiConfig;
use crate::types::{FlipperError, Granularity, ItemId, ItemMapping, LatestPrice, TimeseriesPoint};

const SOURCE_NAME: &str = "wiki";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LatestResponse {
    data: HashMap<ItemId, LatestPrice>,
}

/// One entry of the `/1h` bulk endpoint. Only the volumes are used.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HourlyBucket {
    #[serde(default)]
    high_price_volume: Option<i64>,
    #[serde(default)]
    low_price_volume: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct HourlyResponse {
    data: HashMap<ItemId, HourlyBucket>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    data: Vec<TimeseriesPoint>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct WikiPriceClient {
    http: Client,
    base_url: String,
}

impl WikiPriceClient {
    pub fn new(cfg: &PriceApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(StdDuration::from_secs(cfg.timeout_secs))
            .user_agent(cfg.user_agent.as_str())
            .build()
            .context("Failed to build price API HTTP client")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, FlipperError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(url = %url, ?query, "Fetching from price API");

        let fail = |message: String| FlipperError::TransientFetch {
            endpoint: endpoint.to_string(),
            message,
        };

        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(fail(format!("HTTP {status}: {body}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| fail(format!("decode error: {e}")))
    }
}

/// Copy hourly volumes onto latest prices that lack their own.
fn merge_volumes(latest: &mut HashMap<ItemId, LatestPrice>, hourly: HashMap<ItemId, HourlyBucket>) {
    for (id, bucket) in hourly {
        if let Some(price) = latest.get_mut(&id) {
            if price.high_volume.is_none() {
                price.high_volume = bucket.high_price_volume;
            }
            if price.low_volume.is_none() {
                price.low_volume = bucket.low_price_volume;
            }
        }
    }
}

#[async_trait]
impl PriceSource for WikiPriceClient {
    async fn fetch_latest(&self) -> Result<HashMap<ItemId, LatestPrice>, FlipperError> {
        let (latest, hourly) = tokio::join!(
            self.get_json::<LatestResponse>("latest", &[]),
            self.get_json::<HourlyResponse>("1h", &[]),
        );

        let mut latest = latest?.data;
        match hourly {
            Ok(h) => merge_volumes(&mut latest, h.data),
            Err(e) => warn!(error = %e, "Hourly volumes unavailable, latest prices carry none"),
        }
        debug!(items = latest.len(), "Fetched latest prices");
        Ok(latest)
    }

    async fn fetch_mapping(&self) -> Result<Vec<ItemMapping>, FlipperError> {
        let mapping: Vec<ItemMapping> = self.get_json("mapping", &[]).await?;
        debug!(items = mapping.len(), "Fetched item mapping");
        Ok(mapping)
    }

    async fn fetch_timeseries(
        &self,
        item_id: ItemId,
        granularity: Granularity,
    ) -> Result<Vec<TimeseriesPoint>, FlipperError> {
        let query = [
            ("id", item_id.to_string()),
            ("timestep", granularity.as_str().to_string()),
        ];
        let resp: TimeseriesResponse = self.get_json("timeseries", &query).await?;
        Ok(resp.data)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
