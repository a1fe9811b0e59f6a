//! Version checking against the update server.

use semver::Version;
use std::time::Duration;
use tracing::info;

use crate::manifest::{self, Asset, Manifest};
use crate::utils::errors::{FetchError, Result};
use crate::USER_AGENT;

const MANIFEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a version check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub component: String,
    pub current_version: Version,
    pub latest_version: Version,
    pub update_available: bool,
    /// Asset for the current platform; present iff an update is available.
    pub asset: Option<Asset>,
}

/// Fetches the manifest and compares versions.
pub struct Checker {
    base_url: String,
    http: reqwest::Client,
}

impl Checker {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Fetch the current version manifest from the server.
    pub async fn manifest(&self) -> Result<Manifest> {
        let url = format!("{}/v1/manifest.json", self.base_url);

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(MANIFEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        Ok(response.json::<Manifest>().await?)
    }

    /// Check whether an update is available for `component`.
    pub async fn check(&self, component: &str, current: &Version) -> Result<CheckResult> {
        info!(component, current = %current, "checking for updates");

        let manifest = self.manifest().await?;
        let comp = manifest
            .components
            .get(component)
            .ok_or_else(|| FetchError::ComponentNotFound(component.to_string()))?;

        let latest = manifest::parse_version(&comp.version)
            .map_err(|e| FetchError::Version(comp.version.clone(), e))?;

        let update_available = *current < latest;
        let mut asset = None;

        if update_available {
            let platform = manifest::current_platform();
            asset = Some(
                comp.assets
                    .get(&platform)
                    .cloned()
                    .ok_or(FetchError::NoAsset(platform))?,
            );
            info!(component, current = %current, latest = %latest, "update available");
        } else {
            info!(component, current = %current, "no update available");
        }

        Ok(CheckResult {
            component: component.to_string(),
            current_version: current.clone(),
            latest_version: latest,
            update_available,
            asset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let checker = Checker::new("http://localhost:8080/");
        assert_eq!(checker.base_url, "http://localhost:8080");
    }
}
