//! # ferrocd-api
//!
//! HTTP surface for ferrocd: a WebSocket endpoint streaming permission
//! filtered change notifications, and a health check.

pub mod config;
pub mod error;
pub mod state;
pub mod ws;

use axum::{response::IntoResponse, routing::get, Json, Router};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::ApiError;
pub use state::AppState;

/// Build the router with every route and middleware attached.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
