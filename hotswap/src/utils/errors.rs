//! Error types for the update client (manifest check and download).
//!
//! The updater-side protocol has its own error taxonomy in
//! [`crate::orchestrator::UpdateError`]; this one covers the application
//! side, where everything is a plain I/O or HTTP failure.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid version {0:?}: {1}")]
    Version(String, semver::Error),

    #[error("component {0:?} not found in manifest")]
    ComponentNotFound(String),

    #[error("no asset for platform {0:?}")]
    NoAsset(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;
