//! FLIPPER: Grand Exchange flip advisor
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the market caches, trade history, scoring backend and strategy
//! engine together, and serves the HTTP API until Ctrl+C.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use flipper::api::{self, ApiState};
use flipper::config::AppConfig;
use flipper::history::{BuyLimitTracker, FlipLedger, ProfitReconciler, TradeHistoryStore};
use flipper::market::{Clock, MarketDataCache, PriceSource, SystemClock, TimeseriesCache, WikiPriceClient};
use flipper::scoring::build_oracle;
use flipper::storage::JsonHistoryStore;
use flipper::strategy::tax::TaxCalculator;
use flipper::strategy::StrategyEngine;

const BANNER: &str = r#"
 _____ _     ___ ____  ____  _____ ____
|  ___| |   |_ _|  _ \|  _ \| ____|  _ \
| |_  | |    | || |_) | |_) |  _| | |_) |
|  _| | |___ | ||  __/|  __/| |___|  _ <
|_|   |_____|___|_|   |_|   |_____|_| \_\

  Grand Exchange flip advisor v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("FLIPPER_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        price_api = %cfg.price_api.base_url,
        history_dir = %cfg.storage.history_dir,
        scoring = ?cfg.scoring.backend,
        "FLIPPER starting up"
    );

    // -- Initialise components -------------------------------------------

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tax = TaxCalculator::new(&cfg.tax);

    let source: Arc<dyn PriceSource> = Arc::new(WikiPriceClient::new(&cfg.price_api)?);
    let market = Arc::new(MarketDataCache::new(
        source.clone(),
        clock.clone(),
        cfg.price_api.market_ttl(),
    ));
    let (fine_ttl, coarse_ttl) = cfg.price_api.timeseries_ttls();
    let timeseries = Arc::new(TimeseriesCache::new(source, clock.clone(), fine_ttl, coarse_ttl));

    // Warm the cache; a failure here only means the first requests wait.
    if let Err(e) = market.ensure_fresh().await {
        warn!(error = %e, "Initial market fetch failed, will retry on demand");
    }

    let store: Arc<dyn TradeHistoryStore> = Arc::new(JsonHistoryStore::new(&cfg.storage.history_dir));
    let window = chrono::Duration::hours(cfg.strategy.market.buy_limit_window_hours);
    let limits = Arc::new(BuyLimitTracker::new(store.clone(), clock.clone(), window));
    let ledger = Arc::new(FlipLedger::new(store.clone(), tax.clone()));

    let oracle = build_oracle(&cfg.scoring).context("Failed to initialise scoring backend")?;

    let engine = Arc::new(StrategyEngine::new(
        &cfg.strategy,
        tax.clone(),
        market,
        timeseries,
        oracle,
        limits,
        clock.clone(),
    ));

    let state = Arc::new(ApiState {
        engine,
        ledger,
        store,
        reconciler: ProfitReconciler::new(tax),
        clock,
    });

    // -- Serve -----------------------------------------------------------

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", cfg.server.host, cfg.server.port))?;

    info!(%addr, "Ready. Press Ctrl+C to stop.");
    api::serve(state, addr).await?;

    info!("FLIPPER shut down cleanly");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flipper=info"));

    let json_logging = std::env::var("FLIPPER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
