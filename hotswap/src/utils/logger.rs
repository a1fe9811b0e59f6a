//! Logging setup for the application and updater binaries.
//!
//! Both processes log to stderr; the updater runs detached from any
//! terminal, so its output is only visible when a supervisor captures it.

use tracing_subscriber::EnvFilter;

/// Initialize logging. `RUST_LOG` overrides `fallback_level` when set.
pub fn init(fallback_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("initializing logging: {e}"))
}
