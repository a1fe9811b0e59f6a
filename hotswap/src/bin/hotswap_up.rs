//! hotswap-up - the short-lived updater process.
//!
//! Spawned detached by the application with the command file path and the
//! parent-exit timeout it was configured with.
//! Waits for the application to exit, swaps the binary atomically, validates
//! the result, relaunches the application, and removes the command file.
//! Exits 0 only on full success; each terminal failure class maps to a
//! distinct non-zero exit code.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use hotswap::ipc::{self, UpdateCommand};
use hotswap::orchestrator::{Orchestrator, UpdateError};
use hotswap::{replace, utils};

#[derive(Parser, Debug)]
#[command(author, version, about = "hotswap updater process", long_about = None)]
struct Args {
    /// Path to the update command file written by the application
    #[arg(long, value_name = "FILE")]
    command_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Seconds to wait for the parent process to exit
    #[arg(long, default_value_t = 30)]
    parent_timeout: u64,
}

fn main() {
    let args = Args::parse();
    let _ = utils::logger::init(&args.log_level);

    let command = match UpdateCommand::read_from_file(&args.command_file) {
        Ok(command) => command,
        Err(e) => {
            // Nothing has been touched; the attempt is abandoned outright.
            let err = UpdateError::InvalidCommand(e);
            error!(error = %err, file = %args.command_file.display(), "failed to read update command");
            std::process::exit(err.exit_code());
        }
    };

    info!(
        action = ?command.action,
        target = %command.target_binary.display(),
        parent_pid = command.parent_pid,
        "executing update command"
    );

    let mut orchestrator = Orchestrator::new(replace::platform_strategy())
        .with_parent_timeout(Duration::from_secs(args.parent_timeout));
    let result = orchestrator.run(&command);

    // The command is consumed either way; a fresh attempt gets a fresh file.
    ipc::discard(&args.command_file);

    match result {
        Ok(()) => info!("update completed successfully"),
        Err(e) => {
            match &e {
                UpdateError::RollbackFailed { .. } => {
                    error!(error = %e, "MANUAL RECOVERY REQUIRED: target binary may be missing or broken");
                }
                UpdateError::RolledBack { .. } => {
                    error!(error = %e, "update failed, original binary intact");
                }
                _ => error!(error = %e, "update failed"),
            }
            std::process::exit(e.exit_code());
        }
    }
}
