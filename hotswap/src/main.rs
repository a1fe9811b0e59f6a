//! hotswap - self-updating application entry point.
//!
//! The `update` subcommand downloads and verifies a new binary, writes the
//! update command file, spawns the detached `hotswap-up` process, and exits
//! so the updater can replace this executable.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use semver::Version;
use std::io::Write;
use std::path::{Path, PathBuf};

use hotswap::checker::Checker;
use hotswap::config::Config;
use hotswap::download::Downloader;
use hotswap::ipc::{Action, UpdateCommand};
use hotswap::{manifest, paths, process, utils};

#[derive(Parser, Debug)]
#[command(author, version, about = "A self-updating application", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Update server URL (overrides config)
    #[arg(short, long)]
    server: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show version information
    Version,
    /// Check whether an update is available
    Check,
    /// Download and apply the latest update
    Update,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(server) = args.server {
        config.server.url = server;
    }

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    // Remove leftovers from a previous update before doing anything else.
    if let Err(e) = paths::sweep_stale_backups() {
        tracing::warn!(error = %e, "failed to sweep stale backups");
    }

    match args.command {
        Command::Version => cmd_version(),
        Command::Check => cmd_check(&config).await?,
        Command::Update => cmd_update(&config).await?,
    }

    Ok(())
}

fn current_version() -> Result<Version> {
    manifest::parse_version(env!("CARGO_PKG_VERSION")).context("parsing built-in version")
}

fn cmd_version() {
    println!("hotswap version {}", env!("CARGO_PKG_VERSION"));
    println!("  platform: {}", manifest::current_platform());
}

async fn cmd_check(config: &Config) -> Result<()> {
    let current = current_version()?;
    let checker = Checker::new(&config.server.url);
    let result = checker.check(&config.update.component, &current).await?;

    if result.update_available {
        println!("Update available!");
        println!("  Current: {}", result.current_version);
        println!("  Latest:  {}", result.latest_version);
        println!("\nRun 'hotswap update' to install the update.");
    } else {
        println!("You are running the latest version ({current})");
    }

    Ok(())
}

async fn cmd_update(config: &Config) -> Result<()> {
    let current = current_version()?;
    let checker = Checker::new(&config.server.url);
    let result = checker.check(&config.update.component, &current).await?;

    if !result.update_available {
        println!("You are running the latest version ({current})");
        return Ok(());
    }
    let asset = result
        .asset
        .context("manifest advertised an update without an asset")?;

    println!(
        "Downloading update {} -> {}",
        result.current_version, result.latest_version
    );

    let dest = paths::temp_download_path(&result.latest_version.to_string());
    let url = format!("{}{}", config.server.url.trim_end_matches('/'), asset.url);

    let progress = |downloaded: u64, total: Option<u64>| {
        if let Some(total) = total {
            if total > 0 {
                let pct = downloaded as f64 / total as f64 * 100.0;
                print!("\rDownloading: {pct:.1}%");
                let _ = std::io::stdout().flush();
            }
        }
    };

    let downloader = Downloader::new();
    let download = match downloader.download(&url, &dest, Some(&progress)).await {
        Ok(download) => download,
        Err(e) => {
            let _ = std::fs::remove_file(&dest);
            return Err(e).context("downloading update");
        }
    };
    println!();

    // The updater re-verifies, but a corrupt download is rejected here
    // before the hand-off is ever prepared.
    if download.sha256 != asset.sha256 {
        let _ = std::fs::remove_file(&dest);
        bail!(
            "checksum mismatch: expected {}, got {}",
            asset.sha256,
            download.sha256
        );
    }

    let target = paths::executable_path().context("locating current executable")?;
    let updater = paths::updater_path()?;
    if !updater.exists() {
        let _ = std::fs::remove_file(&dest);
        bail!("updater not found at {}", updater.display());
    }

    let command = UpdateCommand {
        action: Action::Update,
        target_binary: target.clone(),
        new_binary_path: dest.clone(),
        backup_path: paths::backup_path(&target),
        expected_sha256: asset.sha256.clone(),
        restart_binary: Some(target),
        restart_args: config.update.restart_args.clone(),
        parent_pid: std::process::id(),
    };

    let command_file = paths::temp_command_path();
    if let Err(e) = command.write_to_file(&command_file) {
        let _ = std::fs::remove_file(&dest);
        return Err(e).context("writing update command file");
    }

    println!("Launching updater...");
    let updater_args = updater_args(&command_file, config.update.parent_exit_timeout_secs);
    match process::spawn_detached(&updater, &updater_args) {
        Ok(pid) => {
            tracing::info!(updater_pid = pid, "updater started, exiting for update");
            println!("Update in progress, please wait...");
        }
        Err(e) => {
            let _ = std::fs::remove_file(&dest);
            let _ = std::fs::remove_file(&command_file);
            return Err(e).context("starting updater");
        }
    }

    // Exit so the updater can replace this executable.
    Ok(())
}

/// Arguments handed to the spawned updater. The configured parent-exit
/// timeout travels along, so the updater waits as long as this process was
/// told it may take to shut down.
fn updater_args(command_file: &Path, parent_timeout_secs: u64) -> Vec<String> {
    vec![
        "--command-file".to_string(),
        command_file.display().to_string(),
        "--parent-timeout".to_string(),
        parent_timeout_secs.to_string(),
    ]
}
