//! Hosted prediction endpoint.
//!
//! POSTs the feature vector as JSON and expects `{"confidence": f64}` back.
//! Auth: optional `Authorization: Bearer {key}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{Features, ScoringOracle};
use crate::types::FlipperError;

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    confidence: f64,
}

pub struct RemoteOracle {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl RemoteOracle {
    pub fn new(endpoint: String, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("flipper/0.1")
            .build()
            .context("Failed to build scoring HTTP client")?;

        Ok(Self {
            http,
            endpoint,
            api_key: api_key.map(SecretString::new),
        })
    }

    fn fetch_error(&self, message: String) -> FlipperError {
        FlipperError::TransientFetch {
            endpoint: self.endpoint.clone(),
            message,
        }
    }
}

/// Accept only probabilities.
fn check_confidence(confidence: f64) -> Result<f64, FlipperError> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(confidence)
    } else {
        Err(FlipperError::InvalidInput(format!(
            "scoring endpoint returned confidence outside [0, 1]: {confidence}"
        )))
    }
}

#[async_trait]
impl ScoringOracle for RemoteOracle {
    async fn predict(&self, features: &Features) -> Result<f64, FlipperError> {
        features.validate()?;

        let mut req = self.http.post(&self.endpoint).json(features);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }

        let resp = req.send().await.map_err(|e| self.fetch_error(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(self.fetch_error(format!("HTTP {status}: {body}")));
        }

        let parsed: PredictionResponse = resp
            .json()
            .await
            .map_err(|e| self.fetch_error(format!("decode error: {e}")))?;

        debug!(confidence = parsed.confidence, "Remote prediction");
        check_confidence(parsed.confidence)
    }
}
