//! Hotswap library
//!
//! Self-updating binary toolkit built around a hand-off-and-replace protocol:
//! the application downloads and verifies a new binary, writes an
//! [`ipc::UpdateCommand`] to a temp file, spawns the detached `hotswap-up`
//! process, and exits. The updater waits for the application's pid to
//! disappear, swaps the binary atomically, validates the result, restarts
//! the application, and removes its own residue.

pub mod checker;
pub mod config;
pub mod download;
pub mod ipc;
pub mod manifest;
pub mod orchestrator;
pub mod paths;
pub mod process;
pub mod replace;
pub mod utils;

/// User agent sent with manifest and download requests.
pub const USER_AGENT: &str = concat!("hotswap/", env!("CARGO_PKG_VERSION"));

// Re-export commonly used types
pub use ipc::UpdateCommand;
pub use orchestrator::{Orchestrator, UpdateError, UpdateState};
pub use utils::errors::FetchError;
