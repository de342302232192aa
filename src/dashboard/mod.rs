//! Dashboard: Axum web server over the ledger.
//!
//! Serves the JSON API that places, resolves and funds coupons.
//! CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

pub use routes::{AppState, DashboardState};

/// Serve the dashboard until Ctrl-C.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server starting on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Dashboard server error")?;

    info!("Dashboard server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler; run until the process is killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route(
            "/api/coupons",
            get(routes::get_coupons).post(routes::place_coupon),
        )
        .route(
            "/api/coupons/pending",
            put(routes::amend_pending).delete(routes::cancel_pending),
        )
        .route("/api/coupons/pending/resolve", post(routes::resolve_pending))
        .route("/api/transactions", get(routes::get_transactions))
        .route("/api/recommendation", get(routes::get_recommendation))
        .route("/api/preview", get(routes::get_preview))
        .route("/api/deposit", post(routes::deposit))
        .route("/api/withdraw", post(routes::withdraw))
        .route("/api/target", put(routes::set_target))
        .route("/api/backup", post(routes::backup))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
