//! Extraction-based activation with backup and rollback.
//!
//! ## Attempt Lifecycle
//!
//! ```text
//! NotStarted -> BackedUp -> Cleared -> Populated -> Verified -> Committed
//! (any step)  -> RollingBack -> RolledBack | RollbackFailed
//! ```
//!
//! A `RollbackFailed` attempt leaves its backup directory in place.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{Result, ZvmError};
use crate::mirrors::registry::format_timestamp;
use crate::toolchain::archive::ArchiveExtractor;
use crate::toolchain::fs::{FileSystem, StdFileSystem};
use crate::toolchain::platform::Platform;

use super::{ActivationContext, ActivationStrategy};

/// Progress of one transactional activation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    NotStarted,
    BackedUp,
    Cleared,
    Populated,
    Verified,
    Committed,
    RollingBack,
    RolledBack,
    /// Terminal; the backup directory is kept for manual recovery.
    RollbackFailed,
}

/// Written as `metadata.json` next to the backed-up `contents/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub timestamp: String,
    pub backup_path: PathBuf,
    pub bin_contents: Vec<String>,
}

#[derive(Debug)]
struct Backup {
    root: PathBuf,
    contents: PathBuf,
}

/// Activation for platforms without usable symlinks.
///
/// The version is materialised into `bin/` by copying or extracting it. The
/// previous contents are copied to `backups/bin-<timestamp>-<suffix>/` first and
/// restored if clearing, populating, or verifying `bin/` fails.
#[derive(Debug, Clone)]
pub struct TransactionalExtractionActivation<F: FileSystem = StdFileSystem> {
    platform: Platform,
    backups_dir: PathBuf,
    extractor: ArchiveExtractor,
    fs: F,
}

impl TransactionalExtractionActivation<StdFileSystem> {
    #[must_use]
    pub fn new(platform: Platform, backups_dir: &Path, extractor: ArchiveExtractor) -> Self {
        Self::with_fs(platform, backups_dir, extractor, StdFileSystem)
    }
}

impl<F: FileSystem> TransactionalExtractionActivation<F> {
    #[must_use]
    pub fn with_fs(
        platform: Platform,
        backups_dir: &Path,
        extractor: ArchiveExtractor,
        fs: F,
    ) -> Self {
        Self {
            platform,
            backups_dir: backups_dir.to_path_buf(),
            extractor,
            fs,
        }
    }

    /// Runs one attempt and reports the state it finished in.
    pub fn run(&self, ctx: &ActivationContext) -> (ActivationState, Result<()>) {
        let backup = match self.create_backup(ctx) {
            Ok(backup) => backup,
            Err(e) => {
                return (
                    ActivationState::NotStarted,
                    Err(ZvmError::rolled_back(&ctx.version, e)),
                );
            }
        };
        let mut state = if backup.is_some() {
            ActivationState::BackedUp
        } else {
            ActivationState::NotStarted
        };
        debug!(?state, version = %ctx.version, "activation started");

        match self.populate(ctx, &mut state) {
            Ok(()) => {
                if let Some(backup) = backup {
                    self.discard_backup(&backup);
                }
                debug!(state = ?ActivationState::Committed, version = %ctx.version, "activation committed");
                (ActivationState::Committed, Ok(()))
            }
            Err(cause) => {
                warn!(?state, version = %ctx.version, error = %cause, "activation failed, rolling back");
                self.rollback(ctx, backup, cause)
            }
        }
    }

    /// Copies a non-empty `bin/` into a fresh backup directory.
    fn create_backup(&self, ctx: &ActivationContext) -> Result<Option<Backup>> {
        if !self.fs.is_dir(&ctx.bin_dir) {
            return Ok(None);
        }
        let entries = self
            .fs
            .list_dir(&ctx.bin_dir)
            .map_err(|e| ZvmError::io(format!("failed to list {}", ctx.bin_dir.display()), e))?;
        if entries.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let suffix: u32 = rand::rng().random();
        let root = self.backups_dir.join(format!(
            "bin-{}-{suffix:08x}",
            now.format("%Y%m%dT%H%M%S")
        ));
        let backup = Backup {
            contents: root.join("contents"),
            root,
        };

        let metadata = BackupMetadata {
            timestamp: format_timestamp(now),
            backup_path: backup.root.clone(),
            bin_contents: entries
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
        };

        let written = self
            .fs
            .copy_dir(&ctx.bin_dir, &backup.contents)
            .and_then(|()| {
                let json = serde_json::to_vec_pretty(&metadata).map_err(std::io::Error::other)?;
                self.fs.write(&backup.root.join("metadata.json"), &json)
            });
        if let Err(e) = written {
            self.discard_backup(&backup);
            return Err(ZvmError::io(
                format!("failed to back up {}", ctx.bin_dir.display()),
                e,
            ));
        }

        debug!(backup = %backup.root.display(), "bin directory backed up");
        Ok(Some(backup))
    }

    fn populate(&self, ctx: &ActivationContext, state: &mut ActivationState) -> Result<()> {
        let bin = &ctx.bin_dir;
        if self.fs.entry_exists(bin) {
            self.fs
                .remove_dir_all(bin)
                .map_err(|e| ZvmError::io(format!("failed to clear {}", bin.display()), e))?;
        }
        self.fs
            .create_dir_all(bin)
            .map_err(|e| ZvmError::io(format!("failed to create {}", bin.display()), e))?;
        *state = ActivationState::Cleared;

        self.fill_from_payload(ctx)?;
        *state = ActivationState::Populated;

        let exe = bin.join(self.platform.executable_name());
        if !self.fs.exists(&exe) {
            return Err(ZvmError::extraction(format!(
                "{} not found after populating {}",
                self.platform.executable_name(),
                bin.display()
            )));
        }
        *state = ActivationState::Verified;
        Ok(())
    }

    /// Fills `bin/` from, in order of preference: an extracted
    /// `zig-<os>-<arch>-<version>/` directory, a zip archive, or the install
    /// path itself.
    fn fill_from_payload(&self, ctx: &ActivationContext) -> Result<()> {
        let bin = &ctx.bin_dir;
        let extracted = ctx
            .install_path
            .join(self.platform.artifact_stem(&ctx.version));

        if self.fs.is_dir(&extracted) {
            debug!(from = %extracted.display(), "copying extracted directory");
            return self.copy_into_bin(&extracted, bin);
        }

        if let Some(archive) = self.find_zip(ctx) {
            debug!(archive = %archive.display(), "extracting archive into bin");
            self.extractor.extract_zip(&archive, bin)?;
            return self.flatten_single_wrapper(bin);
        }

        self.copy_into_bin(&ctx.install_path, bin)
    }

    fn copy_into_bin(&self, from: &Path, bin: &Path) -> Result<()> {
        self.fs.copy_dir(from, bin).map_err(|e| {
            ZvmError::extraction_with_source(
                format!("failed to copy {} into {}", from.display(), bin.display()),
                e,
            )
        })
    }

    fn find_zip(&self, ctx: &ActivationContext) -> Option<PathBuf> {
        let preferred = ctx
            .install_path
            .join(self.platform.artifact_filename(&ctx.version));
        if self.fs.exists(&preferred) {
            return Some(preferred);
        }
        self.fs
            .list_dir(&ctx.install_path)
            .ok()?
            .into_iter()
            .find(|p| p.extension().is_some_and(|ext| ext == "zip") && !self.fs.is_dir(p))
    }

    /// Moves the contents of a lone wrapper directory up into `bin`.
    fn flatten_single_wrapper(&self, bin: &Path) -> Result<()> {
        let entries = self
            .fs
            .list_dir(bin)
            .map_err(|e| ZvmError::io(format!("failed to list {}", bin.display()), e))?;
        let [wrapper] = entries.as_slice() else {
            return Ok(());
        };
        if !self.fs.is_dir(wrapper) {
            return Ok(());
        }

        let suffix: u32 = rand::rng().random();
        let staging = bin.with_file_name(format!(".zvm-stage-{suffix:08x}"));
        let moved = self.move_children(wrapper, &staging, bin);
        if self.fs.entry_exists(&staging)
            && let Err(e) = self.fs.remove_dir_all(&staging)
        {
            warn!(path = %staging.display(), error = %e, "failed to remove staging directory");
        }
        moved.map_err(|e| {
            ZvmError::extraction_with_source(
                format!("failed to flatten {}", wrapper.display()),
                e,
            )
        })
    }

    fn move_children(&self, wrapper: &Path, staging: &Path, bin: &Path) -> std::io::Result<()> {
        self.fs.rename(wrapper, staging)?;
        for child in self.fs.list_dir(staging)? {
            if let Some(name) = child.file_name() {
                self.fs.rename(&child, &bin.join(name))?;
            }
        }
        Ok(())
    }

    fn rollback(
        &self,
        ctx: &ActivationContext,
        backup: Option<Backup>,
        cause: ZvmError,
    ) -> (ActivationState, Result<()>) {
        debug!(state = ?ActivationState::RollingBack, version = %ctx.version, "restoring bin directory");

        match self.restore(ctx, backup.as_ref()) {
            Ok(()) => {
                if let Some(backup) = &backup {
                    self.discard_backup(backup);
                }
                (
                    ActivationState::RolledBack,
                    Err(ZvmError::rolled_back(&ctx.version, cause)),
                )
            }
            Err(restore_error) => {
                let restore_error = ZvmError::io(
                    format!("failed to restore {}", ctx.bin_dir.display()),
                    restore_error,
                );
                let error = match backup {
                    Some(backup) => {
                        ZvmError::rollback_failed(&ctx.version, cause, restore_error, backup.root)
                    }
                    None => ZvmError::Activation {
                        version: ctx.version.clone(),
                        message: cause.to_string(),
                        backup_path: None,
                        source: Some(Box::new(cause)),
                        rollback_source: Some(Box::new(restore_error)),
                    },
                };
                (ActivationState::RollbackFailed, Err(error))
            }
        }
    }

    fn restore(&self, ctx: &ActivationContext, backup: Option<&Backup>) -> std::io::Result<()> {
        let bin = &ctx.bin_dir;
        if self.fs.entry_exists(bin) {
            self.fs.remove_dir_all(bin)?;
        }
        match backup {
            Some(backup) => self.fs.copy_dir(&backup.contents, bin),
            None => self.fs.create_dir_all(bin),
        }
    }

    fn discard_backup(&self, backup: &Backup) {
        if self.fs.entry_exists(&backup.root)
            && let Err(e) = self.fs.remove_dir_all(&backup.root)
        {
            warn!(path = %backup.root.display(), error = %e, "failed to remove backup directory");
        }
    }
}

impl<F: FileSystem> ActivationStrategy for TransactionalExtractionActivation<F> {
    fn activate(&self, target_path: &Path, version: &str, bin_dir: &Path) -> Result<()> {
        let ctx = ActivationContext::new(target_path, version, bin_dir);
        self.run(&ctx).1
    }

    fn name(&self) -> &'static str {
        "transactional-extraction"
    }
}
