//! Version manifest published by the distribution server.
//!
//! Consumed read-only on the client side; asset hashes are verified against
//! downloaded bytes, never assumed.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub generated: DateTime<Utc>,
    pub components: HashMap<String, Component>,
}

/// A single updatable binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub version: String,
    pub release_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    /// Keyed by platform (`os-arch`).
    pub assets: HashMap<String, Asset>,
}

/// A downloadable binary for one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub url: String,
    pub size: u64,
    pub sha256: String,
}

/// Platform key for the current OS and architecture, e.g. `linux-x86_64`.
pub fn current_platform() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Parse a semantic version, tolerating a leading `v`.
pub fn parse_version(s: &str) -> Result<Version, semver::Error> {
    Version::parse(s.trim_start_matches('v'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_strips_v_prefix() {
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("1.2.3").unwrap(), Version::new(1, 2, 3));
    }

    #[test]
    fn test_parse_version_rejects_garbage() {
        assert!(parse_version("1.2").is_err());
        assert!(parse_version("latest").is_err());
    }

    #[test]
    fn test_version_ordering_is_structural() {
        // Numeric comparison per field, not string comparison.
        assert!(parse_version("1.9.0").unwrap() < parse_version("1.10.0").unwrap());
        assert!(parse_version("2.0.0").unwrap() > parse_version("1.99.99").unwrap());
    }

    #[test]
    fn test_current_platform_shape() {
        let platform = current_platform();
        assert_eq!(platform.split('-').count(), 2);
    }

    #[test]
    fn test_manifest_round_trip() {
        let mut assets = HashMap::new();
        assets.insert(
            "linux-x86_64".to_string(),
            Asset {
                url: "/v1/download/hotswap/linux-x86_64/1.2.0".to_string(),
                size: 1024,
                sha256: "a".repeat(64),
            },
        );
        let mut components = HashMap::new();
        components.insert(
            "hotswap".to_string(),
            Component {
                name: "hotswap".to_string(),
                version: "1.2.0".to_string(),
                release_date: Utc::now(),
                changelog: None,
                assets,
            },
        );
        let manifest = Manifest {
            schema_version: 1,
            generated: Utc::now(),
            components,
        };

        let json = serde_json::to_string(&manifest).unwrap();
        let decoded: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.schema_version, 1);
        assert_eq!(decoded.components["hotswap"].version, "1.2.0");
        assert_eq!(
            decoded.components["hotswap"].assets["linux-x86_64"].size,
            1024
        );
    }
}
