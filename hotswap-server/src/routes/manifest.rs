use crate::error::AppError;
use crate::services::release_index;
use crate::state::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// GET /v1/manifest.json - current version manifest
pub async fn get_manifest(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let releases_dir = state.config.releases_dir.clone();

    // Hashing release binaries is blocking work.
    let manifest = tokio::task::spawn_blocking(move || release_index::build_manifest(&releases_dir))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))??;

    Ok((
        [(header::CACHE_CONTROL, "max-age=60")],
        Json(manifest),
    ))
}
