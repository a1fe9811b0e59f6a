use crate::error::AppError;
use crate::services::release_index;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use hotswap::manifest::parse_version;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

/// GET /v1/download/{component}/{platform}/{version} - stream a release binary
pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path((component, platform, version)): Path<(String, String, String)>,
) -> Result<Response, AppError> {
    info!(component, platform, version, "download requested");

    if !release_index::is_valid_component(&component)
        || !release_index::is_valid_platform(&platform)
        || parse_version(&version).is_err()
    {
        return Err(AppError::BadRequest(
            "invalid component, platform, or version".to_string(),
        ));
    }

    let filename = release_index::asset_file_name(&component, &platform, &version);
    let path = state
        .config
        .releases_dir
        .join(&component)
        .join(&version)
        .join(&filename);

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(_) => {
            warn!(path = %path.display(), "asset not found");
            return Err(AppError::NotFound(format!("no asset {filename}")));
        }
    };

    let len = file.metadata().await.map(|m| m.len()).ok();
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        );
    if let Some(len) = len {
        response = response.header(header::CONTENT_LENGTH, len);
    }

    response
        .body(body)
        .map(IntoResponse::into_response)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
}
