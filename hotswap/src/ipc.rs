//! Cross-process update command channel.
//!
//! The application writes a single [`UpdateCommand`] as pretty-printed JSON
//! to a per-attempt temp path, spawns the updater with that path, and exits.
//! JSON keeps the record self-describing and human-diffable, so the updater
//! can decode it without sharing any runtime state with the writer. The
//! channel is at-most-once: the writer spawns exactly one updater per
//! command, and the updater deletes the file when it reaches a terminal
//! state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("read command file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed command file: {0}")]
    Format(#[from] serde_json::Error),

    #[error("invalid command: {0}")]
    Invalid(String),
}

/// The kind of operation the updater should perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Update,
    Rollback,
}

/// The unit of communication between the application and the updater.
///
/// Created once by the application immediately before spawning the updater,
/// read exactly once by the updater, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCommand {
    pub action: Action,

    /// Binary to replace (usually the application's own executable).
    pub target_binary: PathBuf,

    /// Verified, downloaded binary that will take the target's place.
    pub new_binary_path: PathBuf,

    /// Slot where the old binary is parked during the swap.
    pub backup_path: PathBuf,

    /// Lowercase hex SHA-256 the new binary must hash to; re-verified by the
    /// updater before any filesystem mutation.
    pub expected_sha256: String,

    /// Binary to relaunch after a successful swap, if any.
    #[serde(default)]
    pub restart_binary: Option<PathBuf>,

    #[serde(default)]
    pub restart_args: Vec<String>,

    /// Process that must exit before replacement proceeds.
    pub parent_pid: u32,
}

impl UpdateCommand {
    /// Serialize the command to a JSON file.
    pub fn write_to_file(&self, path: &Path) -> Result<(), CommandError> {
        self.validate()?;
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        debug!(path = %path.display(), "wrote update command");
        Ok(())
    }

    /// Read and validate a command from a JSON file.
    pub fn read_from_file(path: &Path) -> Result<Self, CommandError> {
        let data = std::fs::read_to_string(path)?;
        let command: UpdateCommand = serde_json::from_str(&data)?;
        command.validate()?;
        Ok(command)
    }

    /// Check the structural invariants: target/new/backup are distinct
    /// absolute paths, the expected hash is a lowercase hex SHA-256, and the
    /// parent pid is set.
    pub fn validate(&self) -> Result<(), CommandError> {
        for (name, path) in [
            ("target_binary", &self.target_binary),
            ("new_binary_path", &self.new_binary_path),
            ("backup_path", &self.backup_path),
        ] {
            if !path.is_absolute() {
                return Err(CommandError::Invalid(format!(
                    "{name} must be an absolute path, got {}",
                    path.display()
                )));
            }
        }

        if self.target_binary == self.new_binary_path
            || self.target_binary == self.backup_path
            || self.new_binary_path == self.backup_path
        {
            return Err(CommandError::Invalid(
                "target, new, and backup paths must be distinct".to_string(),
            ));
        }

        if self.expected_sha256.len() != 64
            || !self
                .expected_sha256
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(CommandError::Invalid(
                "expected_sha256 must be 64 lowercase hex characters".to_string(),
            ));
        }

        if self.parent_pid == 0 {
            return Err(CommandError::Invalid("parent_pid must be set".to_string()));
        }

        Ok(())
    }
}

/// Remove the command file, best-effort. Absence afterward is the only goal,
/// so a second call on the same path is not an error.
pub fn discard(path: &Path) {
    let _ = std::fs::remove_file(path);
}
