pub mod download;
pub mod manifest;

use crate::state::AppState;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/v1/manifest.json", get(manifest::get_manifest))
        .route(
            "/v1/download/{component}/{platform}/{version}",
            get(download::get_asset),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> &'static str {
    "Hotswap Update Server\n\n\
     Endpoints:\n\
     \x20 GET /v1/manifest.json - Version manifest\n\
     \x20 GET /v1/download/{component}/{platform}/{version} - Download binary\n\
     \x20 GET /health - Health check\n"
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
