//! Well-known paths for binaries, backups, and hand-off artifacts.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the updater binary, expected next to the application binary.
pub const UPDATER_NAME: &str = "hotswap-up";

/// Extension of executable binaries on this platform.
#[cfg(windows)]
pub const BINARY_EXTENSION: &str = ".exe";
/// Extension of executable binaries on this platform.
#[cfg(not(windows))]
pub const BINARY_EXTENSION: &str = "";

const TEMP_PREFIX: &str = "hotswap-update-";

/// Path of the currently running executable.
pub fn executable_path() -> std::io::Result<PathBuf> {
    std::env::current_exe()
}

/// Path of the updater binary, next to the current executable.
pub fn updater_path() -> std::io::Result<PathBuf> {
    let exe = executable_path()?;
    let dir = exe.parent().unwrap_or(Path::new("."));
    Ok(dir.join(format!("{UPDATER_NAME}{BINARY_EXTENSION}")))
}

/// Backup slot next to a binary: `/bin/app` becomes `/bin/app.old`.
pub fn backup_path(binary: &Path) -> PathBuf {
    let mut name = binary.as_os_str().to_os_string();
    name.push(".old");
    PathBuf::from(name)
}

/// Temp location for a downloaded binary, keyed by version.
pub fn temp_download_path(version: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{TEMP_PREFIX}{version}{BINARY_EXTENSION}"))
}

/// Temp location for the update command, unique per attempt.
pub fn temp_command_path() -> PathBuf {
    std::env::temp_dir().join(format!("{TEMP_PREFIX}cmd-{}.json", uuid::Uuid::new_v4()))
}

/// Remove leftover `.old` backups next to the current executable and stale
/// temp artifacts from interrupted updates. Runs at application startup;
/// this is the deferred half of the rename-only swap strategy, and harmless
/// on platforms whose strategy cleans up immediately.
pub fn sweep_stale_backups() -> std::io::Result<()> {
    let exe = executable_path()?;
    if let (Some(dir), Some(name)) = (exe.parent(), exe.file_name().and_then(|n| n.to_str())) {
        sweep_backups_in(dir, name);
    }

    if let Ok(entries) = std::fs::read_dir(std::env::temp_dir()) {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(TEMP_PREFIX) {
                    debug!(path = %entry.path().display(), "sweeping stale temp file");
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
    }

    Ok(())
}

fn sweep_backups_in(dir: &Path, binary_name: &str) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.ends_with(".old") && name.starts_with(binary_name) {
            debug!(path = %entry.path().display(), "sweeping stale backup");
            let _ = std::fs::remove_file(entry.path());
        }
    }
}
