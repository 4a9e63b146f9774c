//! Symlink-based activation for POSIX platforms.
//!
//! `bin/zig` is a symlink into `versions/<version>/`, so switching versions
//! never copies the toolchain.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{Result, ZvmError};
use crate::toolchain::archive::set_executable_permissions;
use crate::toolchain::fs::{FileSystem, StdFileSystem};
use crate::toolchain::platform::Platform;

use super::{ActivationContext, ActivationStrategy};

/// Activation by pointing `bin/zig` at the version's executable.
///
/// Replacement is remove-then-create, so there is a short window in which the
/// link is absent.
#[derive(Debug, Clone)]
pub struct SymlinkActivation<F: FileSystem = StdFileSystem> {
    platform: Platform,
    fs: F,
}

impl SymlinkActivation<StdFileSystem> {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self::with_fs(platform, StdFileSystem)
    }
}

impl<F: FileSystem> SymlinkActivation<F> {
    #[must_use]
    pub fn with_fs(platform: Platform, fs: F) -> Self {
        Self { platform, fs }
    }

    /// Finds the executable directly in the install path or in the
    /// `zig-<os>-<arch>-<version>` directory an unstripped archive leaves.
    fn resolve_executable(&self, ctx: &ActivationContext) -> Result<PathBuf> {
        let exe = self.platform.executable_name();
        let candidates = [
            ctx.install_path.join(&exe),
            ctx.install_path
                .join(self.platform.artifact_stem(&ctx.version))
                .join(&exe),
        ];

        candidates
            .iter()
            .find(|path| self.fs.exists(path))
            .cloned()
            .ok_or_else(|| {
                let searched = candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                ZvmError::activation(
                    &ctx.version,
                    format!("executable not found (searched {searched})"),
                )
            })
    }
}

impl<F: FileSystem> ActivationStrategy for SymlinkActivation<F> {
    fn activate(&self, target_path: &Path, version: &str, bin_dir: &Path) -> Result<()> {
        let ctx = ActivationContext::new(target_path, version, bin_dir);
        let target = self.resolve_executable(&ctx)?;
        let link = ctx.bin_dir.join(self.platform.executable_name());

        let io_failure = |action: &str, e: std::io::Error| {
            ZvmError::activation(&ctx.version, format!("{action}: {e}"))
        };

        self.fs
            .create_dir_all(&ctx.bin_dir)
            .map_err(|e| io_failure(&format!("failed to create {}", ctx.bin_dir.display()), e))?;

        if self.fs.entry_exists(&link) {
            self.fs
                .remove_file(&link)
                .map_err(|e| io_failure(&format!("failed to remove {}", link.display()), e))?;
        }

        self.fs.symlink(&target, &link).map_err(|e| {
            io_failure(
                &format!("failed to link {} -> {}", link.display(), target.display()),
                e,
            )
        })?;

        set_executable_permissions(&target)?;
        debug!(link = %link.display(), target = %target.display(), "symlink activated");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "symlink"
    }
}
