//! Update orchestration state machine for the updater process.
//!
//! Each state runs to completion before the next begins; the only blocking
//! operation is the bounded wait for the parent process to exit. Checksum
//! verification always happens before the target binary is touched, so
//! every failure up to and including `VerifyingChecksum` abandons the
//! attempt without any rollback. From `Replacing` onward, failures roll
//! back to the parked backup; a rollback that itself fails is terminal and
//! surfaced with maximum severity.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::download;
use crate::ipc::{Action, CommandError, UpdateCommand};
use crate::process::{self, WaitOutcome};
use crate::replace::{self, ReplaceError, SwapStrategy};

/// Default bound on how long the updater waits for the parent to exit.
pub const DEFAULT_PARENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("invalid update command: {0}")]
    InvalidCommand(#[from] CommandError),

    #[error("timed out waiting for parent process {pid} to exit after {timeout:?}")]
    ParentExitTimeout { pid: u32, timeout: Duration },

    #[error("reading new binary for verification: {0}")]
    VerifyFailed(std::io::Error),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("replace failed before any mutation: {0}")]
    Replace(ReplaceError),

    #[error("update failed but the original binary was restored: {cause}")]
    RolledBack { cause: anyhow::Error },

    #[error("update failed and rollback failed too, manual recovery required: {cause}")]
    RollbackFailed { cause: anyhow::Error },
}

impl UpdateError {
    /// Process exit code for the updater binary. Zero is reserved for full
    /// success; each terminal failure class gets a distinct code so
    /// operators can tell "safely reverted" from "binary may be broken".
    pub fn exit_code(&self) -> i32 {
        match self {
            UpdateError::InvalidCommand(_) => 2,
            UpdateError::ParentExitTimeout { .. } => 3,
            UpdateError::VerifyFailed(_) | UpdateError::ChecksumMismatch { .. } => 4,
            UpdateError::Replace(_) => 5,
            UpdateError::RolledBack { .. } => 6,
            UpdateError::RollbackFailed { .. } => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Start,
    WaitingForParentExit,
    VerifyingChecksum,
    Replacing,
    Validating,
    Restarting,
    RollingBack,
    RolledBack,
    Done,
    Failed,
}

/// Sequences the updater's states and decides when to invoke rollback.
pub struct Orchestrator {
    strategy: Box<dyn SwapStrategy>,
    parent_timeout: Duration,
    state: UpdateState,
}

impl Orchestrator {
    pub fn new(strategy: Box<dyn SwapStrategy>) -> Self {
        Self {
            strategy,
            parent_timeout: DEFAULT_PARENT_TIMEOUT,
            state: UpdateState::Start,
        }
    }

    pub fn with_parent_timeout(mut self, timeout: Duration) -> Self {
        self.parent_timeout = timeout;
        self
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Drive the command to a terminal state.
    pub fn run(&mut self, command: &UpdateCommand) -> Result<(), UpdateError> {
        match command.action {
            Action::Update => self.run_update(command),
            Action::Rollback => self.run_rollback(command),
        }
    }

    fn run_update(&mut self, command: &UpdateCommand) -> Result<(), UpdateError> {
        self.wait_for_parent(command.parent_pid)?;

        self.transition(UpdateState::VerifyingChecksum);
        let actual =
            download::file_sha256(&command.new_binary_path).map_err(UpdateError::VerifyFailed)?;
        if actual != command.expected_sha256 {
            // Abort before anything is touched: no rollback needed.
            return Err(UpdateError::ChecksumMismatch {
                expected: command.expected_sha256.clone(),
                actual,
            });
        }
        debug!("checksum verified");

        self.transition(UpdateState::Replacing);
        if let Err(cause) = self.strategy.replace(
            &command.target_binary,
            &command.new_binary_path,
            &command.backup_path,
        ) {
            if cause.target_untouched() {
                return Err(UpdateError::Replace(cause));
            }
            if cause.already_restored() {
                // The engine undid its own first rename; the swap is already
                // reverted.
                self.transition(UpdateState::RollingBack);
                self.transition(UpdateState::RolledBack);
                return Err(UpdateError::RolledBack {
                    cause: anyhow::Error::new(cause),
                });
            }
            if matches!(cause, ReplaceError::NeedsManualRecovery { .. }) {
                self.transition(UpdateState::RollingBack);
                self.transition(UpdateState::Failed);
                return Err(UpdateError::RollbackFailed {
                    cause: anyhow::Error::new(cause),
                });
            }
            return self.roll_back(command, anyhow::Error::new(cause));
        }

        self.transition(UpdateState::Validating);
        if let Err(cause) = replace::validate_executable(&command.target_binary) {
            return self.roll_back(command, anyhow::Error::new(cause));
        }

        self.transition(UpdateState::Restarting);
        if let Some(restart) = &command.restart_binary {
            self.restart(restart, &command.restart_args);
        }

        self.strategy.cleanup_backup(&command.backup_path);
        self.transition(UpdateState::Done);
        info!(target = %command.target_binary.display(), "update complete");
        Ok(())
    }

    fn run_rollback(&mut self, command: &UpdateCommand) -> Result<(), UpdateError> {
        self.wait_for_parent(command.parent_pid)?;

        self.transition(UpdateState::RollingBack);
        match self
            .strategy
            .rollback(&command.target_binary, &command.backup_path)
        {
            Ok(()) => {
                self.transition(UpdateState::RolledBack);
                info!(target = %command.target_binary.display(), "rollback complete");
                Ok(())
            }
            Err(rollback) => {
                self.transition(UpdateState::Failed);
                Err(UpdateError::RollbackFailed {
                    cause: anyhow::Error::new(rollback),
                })
            }
        }
    }

    fn wait_for_parent(&mut self, pid: u32) -> Result<(), UpdateError> {
        self.transition(UpdateState::WaitingForParentExit);
        info!(pid, "waiting for parent process to exit");

        match process::wait_for_exit(pid, self.parent_timeout) {
            WaitOutcome::TimedOut => Err(UpdateError::ParentExitTimeout {
                pid,
                timeout: self.parent_timeout,
            }),
            WaitOutcome::AlreadyGone => {
                debug!(pid, "parent already gone");
                Ok(())
            }
            WaitOutcome::Exited => {
                debug!(pid, "parent exited");
                Ok(())
            }
        }
    }

    /// Relaunch the replaced binary detached. The swap is committed by this
    /// point, so a restart failure is reported but never rolls back.
    fn restart(&self, binary: &Path, args: &[String]) {
        match process::spawn_detached(binary, args) {
            Ok(pid) => info!(pid, path = %binary.display(), "restarted application"),
            Err(e) => {
                error!(error = %e, path = %binary.display(), "failed to restart application, binary swap is committed");
            }
        }
    }

    fn roll_back(
        &mut self,
        command: &UpdateCommand,
        cause: anyhow::Error,
    ) -> Result<(), UpdateError> {
        self.transition(UpdateState::RollingBack);
        warn!(error = %cause, "update failed, rolling back");

        match self
            .strategy
            .rollback(&command.target_binary, &command.backup_path)
        {
            Ok(()) => {
                self.transition(UpdateState::RolledBack);
                Err(UpdateError::RolledBack { cause })
            }
            Err(rollback) => {
                self.transition(UpdateState::Failed);
                Err(UpdateError::RollbackFailed {
                    cause: cause.context(format!("rollback also failed: {rollback}")),
                })
            }
        }
    }

    fn transition(&mut self, next: UpdateState) {
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::replace::{RollbackError, UnlinkSwap};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{tempdir, TempDir};

    fn write_executable(path: &Path, content: &[u8]) {
        std::fs::write(path, content).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Pid of a process that has already exited and been reaped.
    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    fn command_for(dir: &TempDir) -> UpdateCommand {
        let target = dir.path().join("app");
        let new = dir.path().join("app.new");
        write_executable(&target, b"old-binary");
        write_executable(&new, b"new-binary");

        UpdateCommand {
            action: Action::Update,
            target_binary: target,
            new_binary_path: new.clone(),
            backup_path: dir.path().join("app.old"),
            expected_sha256: download::file_sha256(&new).unwrap(),
            restart_binary: None,
            restart_args: vec![],
            parent_pid: dead_pid(),
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Box::new(UnlinkSwap)).with_parent_timeout(Duration::from_secs(2))
    }

    #[test]
    fn test_successful_update() {
        let dir = tempdir().unwrap();
        let command = command_for(&dir);

        let mut orch = orchestrator();
        orch.run(&command).unwrap();

        assert_eq!(orch.state(), UpdateState::Done);
        assert_eq!(
            std::fs::read(&command.target_binary).unwrap(),
            b"new-binary"
        );
        assert!(!command.new_binary_path.exists());
        // Unlink strategy removes the backup immediately on success.
        assert!(!command.backup_path.exists());
    }

    #[test]
    fn test_checksum_mismatch_leaves_target_untouched() {
        let dir = tempdir().unwrap();
        let mut command = command_for(&dir);
        command.expected_sha256 = "0".repeat(64);

        let mut orch = orchestrator();
        let err = orch.run(&command).unwrap_err();

        assert!(matches!(err, UpdateError::ChecksumMismatch { .. }));
        assert_eq!(err.exit_code(), 4);
        assert_eq!(
            std::fs::read(&command.target_binary).unwrap(),
            b"old-binary"
        );
        assert!(!command.backup_path.exists());
    }

    #[test]
    fn test_missing_new_binary_fails_verification() {
        let dir = tempdir().unwrap();
        let mut command = command_for(&dir);
        std::fs::remove_file(&command.new_binary_path).unwrap();
        command.new_binary_path = dir.path().join("gone");

        let mut orch = orchestrator();
        let err = orch.run(&command).unwrap_err();

        assert!(matches!(err, UpdateError::VerifyFailed(_)));
        assert_eq!(
            std::fs::read(&command.target_binary).unwrap(),
            b"old-binary"
        );
    }

    #[test]
    fn test_parent_exit_timeout_aborts_without_mutation() {
        let dir = tempdir().unwrap();
        let mut command = command_for(&dir);

        let mut child = std::process::Command::new("sleep").arg("10").spawn().unwrap();
        command.parent_pid = child.id();

        let mut orch =
            Orchestrator::new(Box::new(UnlinkSwap)).with_parent_timeout(Duration::from_millis(300));
        let err = orch.run(&command).unwrap_err();

        assert!(matches!(err, UpdateError::ParentExitTimeout { .. }));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            std::fs::read(&command.target_binary).unwrap(),
            b"old-binary"
        );
        assert!(!command.backup_path.exists());

        child.kill().unwrap();
        child.wait().unwrap();
    }

    /// Swaps without re-establishing the executable bit, forcing the
    /// validation state to fail after a successful replace.
    struct BrokenPermissionsSwap;

    impl SwapStrategy for BrokenPermissionsSwap {
        fn replace(
            &self,
            target: &Path,
            new_binary: &Path,
            backup: &Path,
        ) -> Result<(), ReplaceError> {
            let _ = std::fs::remove_file(backup);
            std::fs::rename(target, backup).map_err(ReplaceError::BackupFailed)?;
            std::fs::rename(new_binary, target).map_err(ReplaceError::InstallFailed)?;
            std::fs::set_permissions(target, std::fs::Permissions::from_mode(0o644))
                .map_err(ReplaceError::Permissions)?;
            Ok(())
        }

        fn rollback(&self, target: &Path, backup: &Path) -> Result<(), RollbackError> {
            UnlinkSwap.rollback(target, backup)
        }

        fn cleanup_backup(&self, _backup: &Path) {}
    }

    #[test]
    fn test_validation_failure_rolls_back() {
        let dir = tempdir().unwrap();
        let command = command_for(&dir);

        let mut orch = Orchestrator::new(Box::new(BrokenPermissionsSwap))
            .with_parent_timeout(Duration::from_secs(2));
        let err = orch.run(&command).unwrap_err();

        assert!(matches!(err, UpdateError::RolledBack { .. }));
        assert_eq!(err.exit_code(), 6);
        assert_eq!(orch.state(), UpdateState::RolledBack);
        // Final state equals initial state.
        assert_eq!(
            std::fs::read(&command.target_binary).unwrap(),
            b"old-binary"
        );
        assert!(!command.backup_path.exists());
    }

    /// Simulates the engine failing at the second rename and undoing its own
    /// first rename, which is what `swap_files` reports as `InstallFailed`.
    struct FailingInstallSwap;

    impl SwapStrategy for FailingInstallSwap {
        fn replace(
            &self,
            _target: &Path,
            _new_binary: &Path,
            _backup: &Path,
        ) -> Result<(), ReplaceError> {
            Err(ReplaceError::InstallFailed(std::io::Error::other(
                "disk full",
            )))
        }

        fn rollback(&self, _target: &Path, _backup: &Path) -> Result<(), RollbackError> {
            panic!("an already-restored failure must not trigger a second rollback");
        }

        fn cleanup_backup(&self, _backup: &Path) {}
    }

    #[test]
    fn test_install_failure_reports_rolled_back_without_second_rollback() {
        let dir = tempdir().unwrap();
        let command = command_for(&dir);

        let mut orch = Orchestrator::new(Box::new(FailingInstallSwap))
            .with_parent_timeout(Duration::from_secs(2));
        let err = orch.run(&command).unwrap_err();

        assert!(matches!(err, UpdateError::RolledBack { .. }));
        assert_eq!(orch.state(), UpdateState::RolledBack);
        assert_eq!(
            std::fs::read(&command.target_binary).unwrap(),
            b"old-binary"
        );
    }

    #[test]
    fn test_rollback_action_restores_backup() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("app");
        let backup = dir.path().join("app.old");
        write_executable(&target, b"broken");
        write_executable(&backup, b"old-binary");

        let command = UpdateCommand {
            action: Action::Rollback,
            target_binary: target.clone(),
            new_binary_path: dir.path().join("unused"),
            backup_path: backup.clone(),
            expected_sha256: "0".repeat(64),
            restart_binary: None,
            restart_args: vec![],
            parent_pid: dead_pid(),
        };

        let mut orch = orchestrator();
        orch.run(&command).unwrap();

        assert_eq!(orch.state(), UpdateState::RolledBack);
        assert_eq!(std::fs::read(&target).unwrap(), b"old-binary");
        assert!(!backup.exists());
    }

    #[test]
    fn test_rollback_action_without_backup_fails() {
        let dir = tempdir().unwrap();
        let command = UpdateCommand {
            action: Action::Rollback,
            target_binary: dir.path().join("app"),
            new_binary_path: dir.path().join("unused"),
            backup_path: dir.path().join("app.old"),
            expected_sha256: "0".repeat(64),
            restart_binary: None,
            restart_args: vec![],
            parent_pid: dead_pid(),
        };

        let mut orch = orchestrator();
        let err = orch.run(&command).unwrap_err();

        assert!(matches!(err, UpdateError::RollbackFailed { .. }));
        assert_eq!(err.exit_code(), 7);
        assert_eq!(orch.state(), UpdateState::Failed);
    }
}
