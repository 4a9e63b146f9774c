//! Use command for the zvm CLI.
//!
//! Makes an installed version the active one without any network access.
//!
//! ## Usage
//!
//! ```bash
//! zvm use 0.12.0
//! ```

use anyhow::{Result, bail};
use clap::Args;

use crate::errors::ZvmError;
use crate::toolchain::Platform;
use crate::toolchain::activate::{activate_installed, strategy_for};
use crate::toolchain::archive::ArchiveExtractor;
use crate::toolchain::orchestrator::validate_version;

use super::load_environment;

/// Arguments for the use command.
#[derive(Args)]
pub struct UseArgs {
    /// Installed version to activate (e.g., "0.12.0").
    pub version: String,
}

/// Executes the use command.
///
/// # Errors
///
/// Returns an error if the version is not installed or activation fails.
pub fn execute(args: &UseArgs) -> Result<()> {
    let version = &args.version;
    validate_version(version)?;

    let platform = Platform::detect()?;
    let (paths, _config) = load_environment()?;
    let strategy = strategy_for(platform, &paths.backups, ArchiveExtractor::new(&paths.tmp));

    match activate_installed(strategy.as_ref(), &paths, version) {
        Ok(()) => {
            println!("zig {version} is now active.");
            Ok(())
        }
        Err(ZvmError::VersionNotInstalled { .. }) => bail!(
            "zig {version} is not installed.\n\
             Run 'zvm install {version}' to install it first."
        ),
        Err(e) => Err(e.into()),
    }
}
