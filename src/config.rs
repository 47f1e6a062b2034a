//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults, so a partial (or empty) file is valid. Secrets
//! (the remote scoring key) are referenced by env-var name in the config
//! and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::fs;

use crate::storage::DEFAULT_HISTORY_DIR;
use crate::strategy::tax::TaxConfig;
use crate::strategy::StrategyConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub price_api: PriceApiConfig,
    pub storage: StorageConfig,
    pub scoring: ScoringConfig,
    pub tax: TaxConfig,
    pub strategy: StrategyConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PriceApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// How long a latest/mapping snapshot stays fresh.
    pub market_ttl_secs: i64,
    pub timeseries_fine_ttl_secs: i64,
    pub timeseries_coarse_ttl_secs: i64,
}

impl Default for PriceApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://prices.runescape.wiki/api/v1/osrs".into(),
            user_agent: "flipper/0.1 - GE flip advisor".into(),
            timeout_secs: 10,
            market_ttl_secs: 30,
            timeseries_fine_ttl_secs: 300,
            timeseries_coarse_ttl_secs: 3600,
        }
    }
}

impl PriceApiConfig {
    pub fn market_ttl(&self) -> Duration {
        Duration::seconds(self.market_ttl_secs)
    }

    pub fn timeseries_ttls(&self) -> (Duration, Duration) {
        (
            Duration::seconds(self.timeseries_fine_ttl_secs),
            Duration::seconds(self.timeseries_coarse_ttl_secs),
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub history_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_dir: DEFAULT_HISTORY_DIR.into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoringBackend {
    #[default]
    Ensemble,
    Remote,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScoringConfig {
    pub backend: ScoringBackend,
    /// Tree dump for the in-process backend.
    pub model_path: String,
    /// Prediction URL for the remote backend.
    pub endpoint: Option<String>,
    /// Name of the env var holding the remote API key.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            backend: ScoringBackend::Ensemble,
            model_path: "models/flipper_model.json".into(),
            endpoint: None,
            api_key_env: None,
            timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
