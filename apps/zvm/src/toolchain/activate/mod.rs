//! Activation: making an installed version the one behind `bin/zig`.
//!
//! Two strategies exist and are chosen by platform capability:
//!
//! - [`SymlinkActivation`] points `bin/zig` at the executable inside the
//!   version directory. Nothing is deleted until the new target is known to
//!   exist.
//! - [`TransactionalExtractionActivation`] materialises the version into `bin/`
//!   itself, protected by a backup that is restored if any step fails.

mod symlink;
mod transactional;

use std::path::{Path, PathBuf};

pub use symlink::SymlinkActivation;
pub use transactional::TransactionalExtractionActivation;

use tracing::debug;

use crate::errors::{Result, ZvmError};
use crate::toolchain::archive::ArchiveExtractor;
use crate::toolchain::paths::ZvmPaths;
use crate::toolchain::platform::Platform;

/// Makes a fetched and verified version the active one.
pub trait ActivationStrategy {
    /// Activates `version` from the payload at `target_path` into `bin_dir`.
    ///
    /// On success `bin_dir` exposes a runnable executable. On failure the
    /// previous contents of `bin_dir` are left in place.
    ///
    /// # Errors
    ///
    /// Returns an `Activation` error naming the version.
    fn activate(&self, target_path: &Path, version: &str, bin_dir: &Path) -> Result<()>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Inputs of a single activation attempt.
#[derive(Debug, Clone)]
pub struct ActivationContext {
    pub version: String,
    pub install_path: PathBuf,
    pub bin_dir: PathBuf,
}

impl ActivationContext {
    #[must_use]
    pub fn new(install_path: &Path, version: &str, bin_dir: &Path) -> Self {
        Self {
            version: version.to_string(),
            install_path: install_path.to_path_buf(),
            bin_dir: bin_dir.to_path_buf(),
        }
    }
}

/// Activates an already installed version and records it as active.
///
/// # Errors
///
/// Returns `VersionNotInstalled` or the strategy's activation error.
pub fn activate_installed(
    strategy: &dyn ActivationStrategy,
    paths: &ZvmPaths,
    version: &str,
) -> Result<()> {
    if !paths.is_version_installed(version) {
        return Err(ZvmError::version_not_installed(version));
    }
    paths.ensure_directories()?;
    strategy.activate(&paths.version_dir(version), version, &paths.bin)?;
    paths.set_active_version(version)?;
    debug!(%version, strategy = strategy.name(), "activated");
    Ok(())
}

/// Returns the strategy suited to `platform`.
#[must_use]
pub fn strategy_for(
    platform: Platform,
    backups_dir: &Path,
    extractor: ArchiveExtractor,
) -> Box<dyn ActivationStrategy> {
    if platform.supports_symlinks() {
        Box::new(SymlinkActivation::new(platform))
    } else {
        Box::new(TransactionalExtractionActivation::new(
            platform,
            backups_dir,
            extractor,
        ))
    }
}
