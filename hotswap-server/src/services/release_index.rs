//! Builds the version manifest by scanning the releases directory.
//!
//! Layout on disk:
//! `releases/{component}/{version}/{component}-{platform}-{version}[.exe]`
//! The newest version per component (semver order) is advertised, with one
//! asset per platform file found in that version's directory.

use anyhow::Context;
use chrono::Utc;
use hotswap::download::file_sha256;
use hotswap::manifest::{parse_version, Asset, Component, Manifest};
use semver::Version;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Components this server distributes.
pub const COMPONENTS: &[&str] = &["hotswap", "hotswap-up"];

pub fn is_valid_component(component: &str) -> bool {
    COMPONENTS.contains(&component)
}

/// Platform keys are `os-arch` with alphanumeric/underscore segments, which
/// also rules out path traversal in download requests.
pub fn is_valid_platform(platform: &str) -> bool {
    let mut parts = platform.split('-');
    let valid_segment = |s: &str| {
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
    };
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(os), Some(arch), None) if valid_segment(os) && valid_segment(arch)
    )
}

/// File name of an asset on disk.
pub fn asset_file_name(component: &str, platform: &str, version: &str) -> String {
    let ext = if platform.starts_with("windows") {
        ".exe"
    } else {
        ""
    };
    format!("{component}-{platform}-{version}{ext}")
}

/// Scan the releases directory and build the manifest.
pub fn build_manifest(releases_dir: &Path) -> anyhow::Result<Manifest> {
    let mut components = HashMap::new();

    for &name in COMPONENTS {
        let component_dir = releases_dir.join(name);
        if !component_dir.is_dir() {
            continue;
        }

        let Some(version) = latest_version(&component_dir)? else {
            continue;
        };

        let version_dir = component_dir.join(version.to_string());
        let assets = scan_assets(&version_dir, name, &version)?;
        if assets.is_empty() {
            continue;
        }

        components.insert(
            name.to_string(),
            Component {
                name: name.to_string(),
                version: version.to_string(),
                release_date: Utc::now(),
                changelog: None,
                assets,
            },
        );
    }

    Ok(Manifest {
        schema_version: 1,
        generated: Utc::now(),
        components,
    })
}

/// Highest semver directory name under a component directory.
fn latest_version(component_dir: &Path) -> anyhow::Result<Option<Version>> {
    let entries = std::fs::read_dir(component_dir)
        .with_context(|| format!("reading {}", component_dir.display()))?;

    let mut latest: Option<Version> = None;
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Ok(version) = parse_version(name) else {
            warn!(name, "skipping non-semver directory in releases");
            continue;
        };
        if latest.as_ref().map_or(true, |l| version > *l) {
            latest = Some(version);
        }
    }

    Ok(latest)
}

fn scan_assets(
    version_dir: &Path,
    component: &str,
    version: &Version,
) -> anyhow::Result<HashMap<String, Asset>> {
    let mut assets = HashMap::new();
    let entries = std::fs::read_dir(version_dir)
        .with_context(|| format!("reading {}", version_dir.display()))?;

    let prefix = format!("{component}-");
    let suffix = format!("-{version}");

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        let stem = name.strip_suffix(".exe").unwrap_or(name);
        let Some(rest) = stem.strip_prefix(&prefix) else {
            continue;
        };
        let Some(platform) = rest.strip_suffix(&suffix) else {
            continue;
        };
        if !is_valid_platform(platform) {
            continue;
        }

        let size = entry.metadata()?.len();
        let sha256 = match file_sha256(&path) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to hash asset, skipping");
                continue;
            }
        };

        assets.insert(
            platform.to_string(),
            Asset {
                url: format!("/v1/download/{component}/{platform}/{version}"),
                size,
                sha256,
            },
        );
    }

    Ok(assets)
}
