//! Read-only analytics API over the modeled tables.
//!
//! - `GET /health`
//! - `GET /api/reports/top-products?limit=`
//! - `GET /api/channels/{channel_name}/activity`
//! - `GET /api/search/messages?query=&limit=`

pub mod error;
pub mod queries;
pub mod routes;
pub mod state;

use std::path::PathBuf;

use axum::extract::Request;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::Level;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/api/reports/top-products", get(routes::top_products))
        .route("/api/channels/{channel_name}/activity", get(routes::channel_activity))
        .route("/api/search/messages", get(routes::search_messages))
        .with_state(state)
}

/// Serves the API until the process is stopped.
pub async fn serve(bind_addr: &str, database_path: PathBuf) -> anyhow::Result<()> {
    let app = router(AppState::new(database_path)).layer(
        TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::span!(
                Level::INFO,
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
                query = request.uri().query().unwrap_or("")
            )
        }),
    );

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "starting server");

    axum::serve(listener, app).await?;
    Ok(())
}
