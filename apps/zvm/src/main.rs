#![warn(clippy::pedantic)]

//! # Zig Version Manager (zvm)
//!
//! `zvm` downloads, verifies and activates Zig toolchain releases. Downloads
//! are spread over the community mirrors, ranked by how reliably each one has
//! served verified artifacts, with the official origin as the fallback.
//!
//! ## Subcommands
//!
//! - `install` - Install and activate a version
//! - `use` - Activate an installed version
//! - `list` - List installed versions
//! - `mirrors list|sync|reset` - Manage the ranked mirror set
//!
//! ## Examples
//!
//! ```bash
//! zvm install 0.13.0
//! zvm use 0.12.0
//! zvm mirrors sync
//! ```

mod commands;
mod config;
mod errors;
mod logging;
mod mirrors;
mod toolchain;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{install, list, mirrors as mirrors_cmd, use_cmd};
use errors::ZvmError;

/// Exit code used when the user interrupts an install.
const EXIT_INTERRUPTED: i32 = 130;

/// Zig version manager.
#[derive(Parser)]
#[command(
    name = "zvm",
    author,
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ZVM_GIT_COMMIT"), ")"),
    about = "Download, verify and switch between Zig toolchains",
    after_help = "\
ENVIRONMENT VARIABLES:
    ZVM_HOME                Data directory (default: ~/.zvm, %APPDATA%\\zvm on Windows)
    ZVM_ORIGIN              Release origin (default: https://ziglang.org/download)
    ZVM_MIRROR_LIST_URL     Community mirror list URL
    ZVM_NO_MIRRORS          Download from the origin only
    ZVM_LOG                 Log filter, e.g. zvm=debug"
)]
pub struct Cli {
    /// Print debug diagnostics to stderr.
    #[clap(long, short, global = true, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the zvm CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Download, verify and activate a version.
    ///
    /// Mirrors are tried in ranked order; a mirror that times out or serves an
    /// artifact failing verification is deprioritised, and the official origin
    /// is used once every mirror has failed.
    Install(install::InstallArgs),

    /// Activate an installed version.
    Use(use_cmd::UseArgs),

    /// List installed versions and mark the active one.
    List,

    /// Inspect and maintain the ranked mirror set.
    Mirrors(mirrors_cmd::MirrorsArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli).await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Prints an error and returns the process exit code.
///
/// An interrupted install exits with 130 after its cleanup has run; every
/// other failure prints the error chain and exits with 1.
fn handle_error(e: &anyhow::Error) -> i32 {
    if let Some(ZvmError::Interrupted) = e.downcast_ref::<ZvmError>() {
        eprintln!("Interrupted.");
        return EXIT_INTERRUPTED;
    }
    eprintln!("Error: {e:?}");
    if let Some(hint) = recovery_hint(e) {
        eprintln!();
        eprintln!("{hint}");
    }
    1
}

/// Manual recovery instructions for an activation whose rollback failed.
fn recovery_hint(e: &anyhow::Error) -> Option<String> {
    let backup = e.downcast_ref::<ZvmError>()?.retained_backup()?;
    Some(format!(
        "The previous bin directory was kept at {}.\n\
         Copy the contents of its 'contents' folder back into the bin directory to restore it.",
        backup.display()
    ))
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Install(args) => install::execute(&args).await,
        Commands::Use(args) => use_cmd::execute(&args),
        Commands::List => list::execute(),
        Commands::Mirrors(args) => mirrors_cmd::execute(&args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn interrupted_install_exits_with_130() {
        let err = anyhow::Error::from(ZvmError::Interrupted);
        assert_eq!(handle_error(&err), EXIT_INTERRUPTED);
    }

    #[test]
    fn failed_rollback_points_at_retained_backup() {
        let err = anyhow::Error::from(ZvmError::rollback_failed(
            "0.13.0",
            ZvmError::extraction("zig.exe missing"),
            ZvmError::config("copy failed"),
            PathBuf::from("/home/u/.zvm/backups/bin-1"),
        ))
        .context("activation failed");

        let hint = recovery_hint(&err).unwrap();
        assert!(hint.contains("/home/u/.zvm/backups/bin-1"));
        assert_eq!(handle_error(&err), 1);
    }

    #[test]
    fn other_errors_have_no_recovery_hint() {
        let err = anyhow::Error::from(ZvmError::activation("0.13.0", "zig missing"));
        assert!(recovery_hint(&err).is_none());
    }
}
