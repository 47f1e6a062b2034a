//! HTTP API: Axum server exposing the strategy engine and flip ledger.
//!
//! Thin and unauthenticated: callers are expected to sit behind whatever
//! authenticates the trader names. CORS is open for local clients.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::info;

pub use routes::{ApiState, AppState};

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/suggestion", post(routes::post_suggestion))
        .route("/price-suggestion", get(routes::get_price_suggestion))
        .route(
            "/profit-tracking/client-transactions",
            post(routes::post_client_transactions),
        )
        .route("/profit-tracking/client-flips", get(routes::get_client_flips))
        .route("/profit-tracking/realized", get(routes::get_realized))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("API server error")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
