//! Atomic binary replacement with rollback.
//!
//! The swap is two rename operations: target -> backup, then new -> target.
//! Each rename is atomic within a single filesystem, so an observer of the
//! target path sees either the old binary or the new one, never a torn file.
//! The two platform strategies share that sequence and differ in what may
//! happen to the old image afterwards: Unix can unlink a running image
//! immediately (the open handle keeps it valid), Windows must leave the
//! renamed-away image in place until nothing maps it, so its backup is
//! hidden and swept at the next application startup.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ReplaceError {
    #[error("new binary not found at {path}: {source}")]
    MissingNewBinary { path: PathBuf, source: io::Error },

    #[error("backing up current binary: {0}")]
    BackupFailed(io::Error),

    #[error("installing new binary (original binary was restored): {0}")]
    InstallFailed(io::Error),

    #[error(
        "installing new binary failed ({install}) and restoring the backup \
         failed too ({restore}); the target binary may be missing"
    )]
    NeedsManualRecovery { install: io::Error, restore: io::Error },

    #[error("setting executable permissions on target: {0}")]
    Permissions(io::Error),
}

impl ReplaceError {
    /// True when the target path was never touched, so there is nothing for
    /// the caller to roll back.
    pub fn target_untouched(&self) -> bool {
        matches!(
            self,
            ReplaceError::MissingNewBinary { .. } | ReplaceError::BackupFailed(_)
        )
    }

    /// True when the engine already renamed the backup over the target while
    /// failing, so the swap is undone without a separate rollback.
    pub fn already_restored(&self) -> bool {
        matches!(self, ReplaceError::InstallFailed(_))
    }
}

#[derive(Error, Debug)]
pub enum RollbackError {
    #[error("backup not found at {0} and target is missing")]
    MissingBackup(PathBuf),

    #[error("restoring backup: {0}")]
    RestoreFailed(io::Error),
}

#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("stat target binary: {0}")]
    Stat(io::Error),

    #[error("target binary is not executable")]
    NotExecutable,
}

/// Platform-specific swap behavior, selected once at startup via
/// [`platform_strategy`]. Both implementations run the same two-rename
/// sequence; only backup disposal differs.
pub trait SwapStrategy: Send + Sync {
    /// Swap `target` for `new_binary`, parking the old binary at `backup`.
    fn replace(&self, target: &Path, new_binary: &Path, backup: &Path)
        -> Result<(), ReplaceError>;

    /// Restore `backup` over `target`.
    fn rollback(&self, target: &Path, backup: &Path) -> Result<(), RollbackError>;

    /// Dispose of the backup after a fully successful update.
    fn cleanup_backup(&self, backup: &Path);
}

/// Swap strategy for platforms where a running executable's inode can be
/// unlinked or renamed away freely.
pub struct UnlinkSwap;

/// Swap strategy for platforms that forbid deleting a mapped executable
/// image but allow renaming it. The backup is hidden and left in place; the
/// replaced binary sweeps it on its next successful startup.
pub struct RenameOnlySwap;

/// Select the swap strategy for the current execution environment.
#[cfg(windows)]
pub fn platform_strategy() -> Box<dyn SwapStrategy> {
    Box::new(RenameOnlySwap)
}

/// Select the swap strategy for the current execution environment.
#[cfg(not(windows))]
pub fn platform_strategy() -> Box<dyn SwapStrategy> {
    Box::new(UnlinkSwap)
}

impl SwapStrategy for UnlinkSwap {
    fn replace(
        &self,
        target: &Path,
        new_binary: &Path,
        backup: &Path,
    ) -> Result<(), ReplaceError> {
        swap_files(target, new_binary, backup)?;
        set_executable(target)?;

        // Advisory only: a binary without provenance flags cleared still ran
        // the swap correctly, the user just has to approve it manually.
        if let Err(e) = clear_quarantine(target) {
            warn!(error = %e, target = %target.display(), "failed to clear quarantine flag");
        }

        info!(target = %target.display(), "binary replaced");
        Ok(())
    }

    fn rollback(&self, target: &Path, backup: &Path) -> Result<(), RollbackError> {
        restore_backup(target, backup)
    }

    fn cleanup_backup(&self, backup: &Path) {
        // Safe to remove immediately: any still-running old image holds its
        // own open handle to the unlinked inode.
        let _ = std::fs::remove_file(backup);
    }
}

impl SwapStrategy for RenameOnlySwap {
    fn replace(
        &self,
        target: &Path,
        new_binary: &Path,
        backup: &Path,
    ) -> Result<(), ReplaceError> {
        swap_files(target, new_binary, backup)?;
        set_executable(target)?;
        hide_file(backup);

        info!(target = %target.display(), "binary replaced, backup deferred for sweep");
        Ok(())
    }

    fn rollback(&self, target: &Path, backup: &Path) -> Result<(), RollbackError> {
        restore_backup(target, backup)
    }

    fn cleanup_backup(&self, _backup: &Path) {
        // Deleting the old image now can fail or corrupt a still-loaded
        // mapping. The hidden backup stays put; the next application startup
        // sweeps it once nothing references it.
    }
}

/// The shared two-rename sequence.
fn swap_files(target: &Path, new_binary: &Path, backup: &Path) -> Result<(), ReplaceError> {
    if let Err(source) = std::fs::metadata(new_binary) {
        return Err(ReplaceError::MissingNewBinary {
            path: new_binary.to_path_buf(),
            source,
        });
    }

    // Discard any stale backup from an earlier attempt.
    let _ = std::fs::remove_file(backup);

    debug!(
        target = %target.display(),
        new = %new_binary.display(),
        backup = %backup.display(),
        "swapping binaries"
    );

    std::fs::rename(target, backup).map_err(ReplaceError::BackupFailed)?;

    if let Err(install) = std::fs::rename(new_binary, target) {
        // Undo the first rename so the target slot never stays empty.
        return match std::fs::rename(backup, target) {
            Ok(()) => Err(ReplaceError::InstallFailed(install)),
            Err(restore) => Err(ReplaceError::NeedsManualRecovery { install, restore }),
        };
    }

    Ok(())
}

fn restore_backup(target: &Path, backup: &Path) -> Result<(), RollbackError> {
    if !backup.exists() {
        // No backup but the target slot is occupied: the engine's in-flight
        // undo already put the original back. Nothing left to do.
        if target.exists() {
            warn!(
                target = %target.display(),
                "no backup to restore, target already present"
            );
            return Ok(());
        }
        return Err(RollbackError::MissingBackup(backup.to_path_buf()));
    }

    warn!(
        target = %target.display(),
        backup = %backup.display(),
        "rolling back to backup binary"
    );

    // Clear a half-installed new binary out of the slot first.
    let _ = std::fs::remove_file(target);

    std::fs::rename(backup, target).map_err(RollbackError::RestoreFailed)?;

    info!(target = %target.display(), "rollback complete");
    Ok(())
}

/// Confirm the replaced file is present and runnable.
pub fn validate_executable(path: &Path) -> Result<(), ValidateError> {
    let metadata = std::fs::metadata(path).map_err(ValidateError::Stat)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ValidateError::NotExecutable);
        }
    }

    #[cfg(not(unix))]
    let _ = metadata;

    Ok(())
}

/// A renamed file does not inherit the destination's prior executable bit,
/// so re-establish permissions explicitly after the swap.
#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), ReplaceError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(ReplaceError::Permissions)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), ReplaceError> {
    Ok(())
}

/// Clear the macOS download-provenance flag so the swapped binary runs
/// without manual approval. A missing attribute is not an error.
#[cfg(target_os = "macos")]
fn clear_quarantine(path: &Path) -> io::Result<()> {
    let _ = std::process::Command::new("xattr")
        .args(["-d", "com.apple.quarantine"])
        .arg(path)
        .output()?;
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn clear_quarantine(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(windows)]
fn hide_file(path: &Path) {
    use windows::core::HSTRING;
    use windows::Win32::Storage::FileSystem::{SetFileAttributesW, FILE_ATTRIBUTE_HIDDEN};

    let wide = HSTRING::from(path.as_os_str());
    unsafe {
        let _ = SetFileAttributesW(&wide, FILE_ATTRIBUTE_HIDDEN);
    }
}

#[cfg(not(windows))]
fn hide_file(_path: &Path) {}
