//! Utility modules shared by the application and updater binaries.

pub mod errors;
pub mod logger;

pub use errors::{FetchError, Result};
