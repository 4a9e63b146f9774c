//! Install command for the zvm CLI.
//!
//! ## Usage
//!
//! ```bash
//! zvm install 0.13.0
//! ```
//!
//! Mirrors are tried first, in ranked order, and the origin is the fallback.
//! Interrupting the install with Ctrl-C marks the download failed and removes
//! partial files before exiting.

use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::errors::ZvmError;
use crate::toolchain::orchestrator::{DownloadSource, validate_version};
use crate::toolchain::{CancellationContext, DownloadOrchestrator, HttpFetcher, Platform};

use super::load_environment;

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    /// Version to install (e.g., "0.13.0").
    pub version: String,
}

/// Executes the install command.
///
/// # Errors
///
/// Returns an error if the version is invalid, every download source fails,
/// or activation fails.
pub async fn execute(args: &InstallArgs) -> Result<()> {
    let version = &args.version;
    validate_version(version)?;

    let platform = Platform::detect()?;
    let (paths, config) = load_environment()?;
    let fetcher = HttpFetcher::new(Duration::from_secs(config.request_timeout_secs))?;
    let mut orchestrator = DownloadOrchestrator::new(paths, config, platform, fetcher)?;
    let cancel = CancellationContext::new();

    println!("Installing zig {version} for {platform}...");

    let outcome = tokio::select! {
        result = orchestrator.install(version, &cancel) => result?,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            return Err(ZvmError::Interrupted.into());
        }
    };

    match &outcome.source {
        DownloadSource::AlreadyInstalled => {
            println!("zig {version} is already installed.");
        }
        DownloadSource::Mirror(mirror) => println!("Downloaded from mirror {mirror}."),
        DownloadSource::Origin => println!("Downloaded from origin."),
    }
    if outcome.verification.checksum_verified {
        println!("Checksum verified.");
    }
    if outcome.verification.minisign_verified {
        println!("Signature verified.");
    }
    println!(
        "zig {} is now active ({} activation).",
        outcome.version, outcome.strategy
    );

    Ok(())
}
